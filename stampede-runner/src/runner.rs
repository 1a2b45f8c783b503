//! Command line runner for stampede load tests.
//!
//! Loads a JSON [`RunConfig`], runs it against the real network and exports the report.
use anyhow::Context;
use clap::{Parser, ValueEnum};
use stampede::prelude::*;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn};

const DEFAULT_LOG_FILTER: &str = "stampede=info,stampede_runner=info";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Json,
    Text,
}

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Path to a JSON run configuration.
    pub config: PathBuf,

    /// Where to write the report. Overrides `report_output_path` from the configuration.
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = ReportFormat::Json)]
    pub format: ReportFormat,

    /// `tracing` filter directives, e.g. `stampede=debug`.
    #[arg(long, default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
}

/// Runs one load test from a configuration file.
///
/// # Example
///
/// ```ignore
/// $ stampede-runner configs/search.json --report out/summary.json
/// $ stampede-runner configs/search.json --format text --log-filter stampede=debug
/// ```
pub struct StampedeRunner {
    config_path: PathBuf,
    report_path: Option<PathBuf>,
    format: ReportFormat,
}

impl StampedeRunner {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            report_path: None,
            format: ReportFormat::default(),
        }
    }

    pub fn from_cli(cli: &Cli) -> Self {
        Self::new(&cli.config)
            .format(cli.format)
            .report_path(cli.report.clone())
    }

    pub fn report_path(mut self, path: Option<PathBuf>) -> Self {
        self.report_path = path;
        self
    }

    pub fn format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    #[instrument(name = "stampede", skip_all, fields(config = %self.config_path.display()))]
    pub async fn run(self) -> ExitCode {
        let config = match load_config(&self.config_path) {
            Ok(config) => config,
            Err(err) => {
                error!("{err:#}");
                return ExitCode::InvalidConfig;
            }
        };

        let report_path = self
            .report_path
            .clone()
            .or_else(|| config.report_output_path.clone());

        let test = LoadTest::from_config(config, HttpTransport::new());
        abort_on_ctrl_c(test.abort_handle());

        let report = match test.await {
            Ok(report) => report,
            Err(err) => {
                error!("Invalid configuration: {err}");
                return ExitCode::InvalidConfig;
            }
        };

        let payload = ReportPayload::from(&report);
        match TextSummary.render(&payload) {
            Ok(summary) => println!("{}", String::from_utf8_lossy(&summary)),
            Err(err) => warn!("Could not render summary: {err}"),
        }

        if let Some(path) = report_path {
            let renderer: &dyn Renderer = match self.format {
                ReportFormat::Json => &JsonRenderer,
                ReportFormat::Text => &TextSummary,
            };
            if let Err(err) = write_report(&path, renderer, &payload) {
                error!("{err}");
                return ExitCode::ReportFailed;
            }
        }

        report.exit_code()
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<RunConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
    Ok(config)
}

fn abort_on_ctrl_c(abort: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping virtual users and reporting the partial run");
            abort.cancel();
        }
    });
}
