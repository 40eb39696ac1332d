use serde::{Deserialize, Serialize};

/// Request to fetch a container's output as a frame stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsRequest {
    pub container_id: String,
    /// Keep the stream open for future output instead of ending after the
    /// currently buffered output.
    pub follow: bool,
    /// Only output produced at or after this unix timestamp (0 = everything).
    pub since: i64,
    pub stdout: bool,
    pub stderr: bool,
}

impl LogsRequest {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            ..Default::default()
        }
    }

    pub fn with_follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn with_since(mut self, since: i64) -> Self {
        self.since = since;
        self
    }

    pub fn with_stdout(mut self, stdout: bool) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn with_stderr(mut self, stderr: bool) -> Self {
        self.stderr = stderr;
        self
    }
}
