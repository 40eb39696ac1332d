use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Container Readiness State
// =============================================================================

/// Health reported by an image-defined healthcheck.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
    None,
}

/// Point-in-time snapshot of a container's state, fetched fresh on every poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerState {
    pub running: bool,
    pub paused: bool,
    /// Exit code of the main process; only meaningful once stopped.
    pub exit_code: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub health: Option<HealthStatus>,
}

impl ContainerState {
    /// A container that has been started and is still running.
    pub fn running_since(started_at: DateTime<Utc>) -> Self {
        Self {
            running: true,
            started_at: Some(started_at),
            ..Default::default()
        }
    }

    /// A container whose main process has exited.
    pub fn exited(exit_code: i64, finished_at: DateTime<Utc>) -> Self {
        Self {
            exit_code: Some(exit_code),
            finished_at: Some(finished_at),
            ..Default::default()
        }
    }

    /// Neither running nor paused, and the engine recorded a finish time.
    pub fn is_stopped(&self) -> bool {
        !self.running && !self.paused && self.finished_at.is_some()
    }

    /// Running continuously for at least `minimum` as of `now`.
    pub fn is_running_for(&self, minimum: Duration, now: DateTime<Utc>) -> bool {
        if !self.running {
            return false;
        }
        match (self.started_at, chrono::Duration::from_std(minimum)) {
            (Some(started), Ok(min)) => started + min <= now,
            _ => false,
        }
    }

    pub fn exited_successfully(&self) -> bool {
        self.is_stopped() && self.exit_code == Some(0)
    }
}

/// Parse an engine timestamp. Empty strings and the engine's zero time
/// (`0001-01-01T00:00:00Z`) mean "never happened".
pub fn parse_engine_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() || raw.starts_with("0001-01-01") {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Result of a container inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
}
