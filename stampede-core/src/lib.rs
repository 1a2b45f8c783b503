mod check;
mod config;
mod constants;
mod data;
mod error;
mod metrics;
mod profile;
mod stats;
mod threshold;

pub use check::*;
pub use config::*;
pub use constants::*;
pub use data::*;
pub use error::*;
pub use metrics::*;
pub use profile::*;
pub use stats::*;
pub use threshold::*;
