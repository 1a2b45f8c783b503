use crate::MetricKind;
use std::time::Duration;
use thiserror::Error;

/// Problems detected while validating a run configuration.
///
/// Every variant is raised before the first virtual user is spawned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("No stages configured")]
    NoStages,

    #[error("Stages add up to a zero-length run")]
    ZeroDuration,

    #[error("Target URL is empty")]
    EmptyUrl,

    #[error("Control tick must be greater than zero")]
    ZeroTick,

    #[error("Request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("Think time range is inverted ({min:?} > {max:?})")]
    InvalidThinkTime { min: Duration, max: Duration },

    #[error("Status range {min}..={max} is empty")]
    InvalidStatusRange { min: u16, max: u16 },

    #[error("Invalid check `{name}`: {reason}")]
    InvalidCheck { name: String, reason: String },

    #[error("Threshold references unknown metric `{metric}`")]
    UnknownMetric { metric: String },

    #[error("Invalid threshold `{expression}` on `{metric}`: {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error("`{selector}` cannot be applied to {kind} metric `{metric}`")]
    IncompatibleSelector {
        metric: String,
        selector: String,
        kind: MetricKind,
    },
}
