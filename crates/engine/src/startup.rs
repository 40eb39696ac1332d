//! Startup checks: poll a container until it is ready, failed, or out of time.

use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use testbed_core::config::{StartupConfig, DEFAULT_STARTUP_TIMEOUT_SECS};
use testbed_core::{ContainerState, EngineGateway, Result};

// =============================================================================
// Verdicts and Strategies
// =============================================================================

/// Classification of one observed container state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupVerdict {
    /// Not decided yet; keep polling.
    Unknown,
    Successful,
    Failed,
}

impl StartupVerdict {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Rule deciding whether a container has started up correctly.
pub trait StartupCheckStrategy: Send + Sync {
    fn check_startup_state(&self, state: &ContainerState) -> StartupVerdict;
}

impl<F> StartupCheckStrategy for F
where
    F: Fn(&ContainerState) -> StartupVerdict + Send + Sync,
{
    fn check_startup_state(&self, state: &ContainerState) -> StartupVerdict {
        self(state)
    }
}

/// Ready as soon as the container is observed running.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsRunningStartupCheck;

impl StartupCheckStrategy for IsRunningStartupCheck {
    fn check_startup_state(&self, state: &ContainerState) -> StartupVerdict {
        if state.running {
            StartupVerdict::Successful
        } else if state.is_stopped() {
            StartupVerdict::Failed
        } else {
            StartupVerdict::Unknown
        }
    }
}

/// For containers that run to completion: ready once stopped with exit code 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct OneShotStartupCheck;

impl StartupCheckStrategy for OneShotStartupCheck {
    fn check_startup_state(&self, state: &ContainerState) -> StartupVerdict {
        if !state.is_stopped() {
            StartupVerdict::Unknown
        } else if state.exited_successfully() {
            StartupVerdict::Successful
        } else {
            StartupVerdict::Failed
        }
    }
}

/// Ready once the container has stayed up for a minimum duration.
#[derive(Debug, Clone, Copy)]
pub struct MinimumDurationRunningStartupCheck {
    minimum: Duration,
}

impl MinimumDurationRunningStartupCheck {
    pub fn new(minimum: Duration) -> Self {
        Self { minimum }
    }
}

impl StartupCheckStrategy for MinimumDurationRunningStartupCheck {
    fn check_startup_state(&self, state: &ContainerState) -> StartupVerdict {
        if state.is_running_for(self.minimum, Utc::now()) {
            StartupVerdict::Successful
        } else if state.is_stopped() {
            StartupVerdict::Failed
        } else {
            StartupVerdict::Unknown
        }
    }
}

// =============================================================================
// Poll Rate Limiter
// =============================================================================

/// Constant-throughput throttle on state polls, shared by every waiter.
pub struct PollRateLimiter {
    limiter: DefaultDirectRateLimiter,
    period: Duration,
}

impl PollRateLimiter {
    /// At most one poll per `period`, without bursts.
    pub fn with_period(period: Duration) -> Self {
        let quota =
            Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::direct(quota),
            period,
        }
    }

    pub fn per_second() -> Self {
        Self::with_period(Duration::from_secs(1))
    }

    /// The process-wide limiter: one poll per second across all checkers.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<PollRateLimiter>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(Self::per_second()))
            .clone()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for permission to issue one poll.
    pub async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }
}

// =============================================================================
// Startup Checker
// =============================================================================

/// Polls a container through the gateway until its strategy reaches a
/// terminal verdict or the timeout elapses.
pub struct StartupChecker {
    strategy: Box<dyn StartupCheckStrategy>,
    timeout: Duration,
    limiter: Arc<PollRateLimiter>,
}

impl StartupChecker {
    pub fn new(strategy: impl StartupCheckStrategy + 'static) -> Self {
        Self {
            strategy: Box::new(strategy),
            timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS),
            limiter: PollRateLimiter::global(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Take the timeout from configuration.
    pub fn with_config(self, config: &StartupConfig) -> Self {
        self.with_timeout(config.timeout())
    }

    /// Replace the process-wide limiter (mainly for tests).
    pub fn with_rate_limiter(mut self, limiter: Arc<PollRateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the current state once and classify it.
    pub async fn check_startup_state(
        &self,
        gateway: &dyn EngineGateway,
        container_id: &str,
    ) -> Result<StartupVerdict> {
        let info = gateway.inspect_container(container_id).await?;
        Ok(self.strategy.check_startup_state(&info.state))
    }

    /// Returns `true` on success, `false` on failure or timeout. Gateway
    /// errors, including unsupported inspection, are returned as-is.
    pub async fn wait_until_startup_successful(
        &self,
        gateway: &dyn EngineGateway,
        container_id: &str,
    ) -> Result<bool> {
        let poll = self.poll_until_verdict(gateway, container_id);
        match tokio::time::timeout(self.timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    container = %container_id,
                    timeout = ?self.timeout,
                    "Container did not reach a startup verdict in time"
                );
                Ok(false)
            }
        }
    }

    async fn poll_until_verdict(
        &self,
        gateway: &dyn EngineGateway,
        container_id: &str,
    ) -> Result<bool> {
        loop {
            self.limiter.until_ready().await;
            let verdict = self.check_startup_state(gateway, container_id).await?;
            tracing::debug!(container = %container_id, ?verdict, "Startup state polled");
            match verdict {
                StartupVerdict::Successful => return Ok(true),
                StartupVerdict::Failed => return Ok(false),
                StartupVerdict::Unknown => continue,
            }
        }
    }
}
