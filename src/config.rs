use std::time::Duration;

/// Grace window between the graceful signal and the forceful group kill.
pub const DEFAULT_GRACE_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for a single executor instance.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How long to wait after SIGTERM before SIGKILLing the process group.
    pub grace_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            grace_timeout: DEFAULT_GRACE_TIMEOUT,
        }
    }
}

impl ExecutorConfig {
    pub fn with_grace_timeout(mut self, grace_timeout: Duration) -> Self {
        self.grace_timeout = grace_timeout;
        self
    }
}
