//! Routing of failures raised by pooled work.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::{BoxedError, TRACING_TARGET_PARALLEL};

/// Callback receiving every failure routed as [`Criticality::Critical`].
pub type Escalation = Arc<dyn Fn(&BoxedError) + Send + Sync>;

/// How a failure of pooled work is reported.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Logged at error level and handed to the escalation callback.
    #[default]
    Critical,
    /// Logged at warn level only.
    NonCritical,
}

/// Routes failures to the escalation path or the log-only path.
#[derive(Clone, Default)]
pub struct FailureRouter {
    escalation: Option<Escalation>,
}

impl FailureRouter {
    /// Creates a router without an escalation callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router escalating critical failures to `escalation`.
    pub fn with_escalation(escalation: Escalation) -> Self {
        Self {
            escalation: Some(escalation),
        }
    }

    /// Reports `error` according to `criticality`.
    pub fn route(&self, criticality: Criticality, error: &BoxedError) {
        match criticality {
            Criticality::Critical => {
                tracing::error!(
                    target: TRACING_TARGET_PARALLEL,
                    error = %error,
                    "Critical failure in pooled work"
                );
                if let Some(escalation) = &self.escalation {
                    escalation(error);
                }
            }
            Criticality::NonCritical => {
                tracing::warn!(
                    target: TRACING_TARGET_PARALLEL,
                    error = %error,
                    "Non-critical failure in pooled work"
                );
            }
        }
    }
}

impl std::fmt::Debug for FailureRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureRouter")
            .field("escalation", &self.escalation.is_some())
            .finish()
    }
}
