use crate::{CheckResult, TRANSPORT_FAILURE_STATUS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Coarse classification of a request that never produced a response.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Result of one virtual user iteration.
///
/// `failed` is decided by whoever builds the outcome (usually against the expected status
/// range); transport failures always carry [`TRANSPORT_FAILURE_STATUS`] and are always failed.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub status: u16,
    pub duration: Duration,
    pub error: Option<TransportErrorKind>,
    pub failed: bool,
    pub checks: Vec<CheckResult>,
}

impl RequestOutcome {
    pub fn response(status: u16, duration: Duration, failed: bool) -> Self {
        Self {
            status,
            duration,
            error: None,
            failed,
            checks: vec![],
        }
    }

    pub fn transport_failure(kind: TransportErrorKind, duration: Duration) -> Self {
        Self {
            status: TRANSPORT_FAILURE_STATUS,
            duration,
            error: Some(kind),
            failed: true,
            checks: vec![],
        }
    }

    pub fn with_checks(mut self, checks: Vec<CheckResult>) -> Self {
        self.checks = checks;
        self
    }
}
