//! Worker-pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of attempts for retried work.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default delay between two attempts of retried work.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Default name given to drain threads spawned by [`super::Decoupled`].
pub const DEFAULT_DRAIN_THREAD_NAME: &str = "weave-drain";

/// Configuration for [`super::TokioParallelOperations`] with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Attempts used by [`super::TokioParallelOperations::execute_with_defaults`].
    pub retry_attempts: u32,
    /// Delay between attempts used with the defaults.
    pub retry_delay: Duration,
    /// Name given to drain threads.
    pub drain_thread_name: String,
}

impl ParallelConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            drain_thread_name: DEFAULT_DRAIN_THREAD_NAME.to_string(),
        }
    }

    /// Sets the default retry attempts.
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Sets the default retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the drain thread name.
    #[must_use]
    pub fn with_drain_thread_name(mut self, name: impl Into<String>) -> Self {
        self.drain_thread_name = name.into();
        self
    }

    /// Validate the configuration and return any issues.
    pub fn validate(&self) -> Result<(), String> {
        if self.retry_attempts == 0 {
            return Err("Retry attempts must be at least 1".to_string());
        }
        if self.drain_thread_name.is_empty() {
            return Err("Drain thread name cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self::new()
    }
}
