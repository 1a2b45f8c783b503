use std::time::Duration;

/// How often the scheduler recomputes the desired number of virtual users.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Upper bound on a single request when the configuration does not set one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Status recorded for an iteration whose request never produced a response.
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

pub const DEFAULT_RUN_NAME: &str = "default";
