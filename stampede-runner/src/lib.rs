pub mod runner;

pub use crate::runner::{load_config, Cli, ReportFormat, StampedeRunner};
