#![cfg_attr(docsrs, feature(doc_cfg))]
//! Staged virtual-user load testing with threshold verdicts.
//!
//! A [`LoadTest`] ramps a population of virtual users up and down over a sequence of
//! [`Stage`](stampede_core::Stage)s. Every user loops on one request against the target, runs its
//! checks and records the outcome. When the last stage elapses every user is joined, the final
//! metrics are evaluated against the configured thresholds and a [`RunReport`] is returned.
//!
//! ```no_run
//! use stampede::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let report = LoadTest::new("http://localhost:3000/", HttpTransport::new())
//!         .stages(vec![
//!             Stage::new(Duration::from_secs(30), 20),
//!             Stage::new(Duration::from_secs(60), 20),
//!             Stage::new(Duration::from_secs(30), 0),
//!         ])
//!         .threshold("http_req_duration", "p(95)<300ms")
//!         .threshold("http_req_failed", "rate<0.01")
//!         .await
//!         .unwrap();
//!
//!     print!("{}", String::from_utf8_lossy(&TextSummary.render(&(&report).into()).unwrap()));
//! }
//! ```

pub mod accumulator;
pub mod evaluator;
pub mod report;
pub mod scheduler;
pub mod transport;
pub mod vu;

pub(crate) mod histogram;
pub(crate) mod timer;

pub use histogram::EXACT_SAMPLE_LIMIT;
pub use load_test::{ExitCode, LoadTest, RunReport};
pub use stampede_core as core;

pub mod prelude {
    pub use crate::accumulator::{MetricSnapshot, MetricSummary};
    pub use crate::load_test::{ExitCode, LoadTest, RunReport};
    pub use crate::report::{write_report, JsonRenderer, Renderer, ReportPayload, TextSummary};
    pub use crate::transport::{HttpRequest, Transport, TransportError, TransportResponse};

    #[cfg(feature = "http")]
    pub use crate::transport::HttpTransport;

    pub use stampede_core::{
        Check, ConfigError, RunConfig, Stage, StatusRange, ThinkTime, Threshold, Verdict,
    };
}
