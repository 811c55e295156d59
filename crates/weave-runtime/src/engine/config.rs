//! Engine configuration.

use std::time::Duration;

use derive_builder::Builder;

/// Configuration for the workplan execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EngineConfig {
    /// Interval at which pausing polls for in-flight step logic.
    #[builder(default = "Duration::from_millis(10)")]
    pub drain_poll_interval: Duration,

    /// Upper bound for waiting on in-flight step logic while pausing.
    ///
    /// `None` waits indefinitely.
    #[builder(default, setter(strip_option))]
    pub drain_timeout: Option<Duration>,
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(interval) = self.drain_poll_interval
            && interval.is_zero()
        {
            return Err("drain_poll_interval must be non-zero".into());
        }
        if let Some(Some(timeout)) = self.drain_timeout
            && timeout.is_zero()
        {
            return Err("drain_timeout must be non-zero when set".into());
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Returns a builder for creating an engine configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drain_poll_interval: Duration::from_millis(10),
            drain_timeout: None,
        }
    }
}
