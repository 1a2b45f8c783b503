//! Rendering and exporting the end-of-run artifact.
//!
//! A [`ReportPayload`] is a borrowed view over a [`RunReport`](crate::RunReport). Renderers turn
//! it into bytes; [`write_report`] puts those bytes on disk.
use crate::accumulator::{CheckTally, MetricSummary};
use crate::load_test::RunReport;
use crate::scheduler::ConcurrencyPoint;
use serde::Serialize;
use stampede_core::{MetricKind, Verdict};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to format report: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("Failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload<'a> {
    pub metrics: &'a BTreeMap<String, MetricSummary>,
    pub checks: &'a BTreeMap<String, CheckTally>,
    pub thresholds_verdict: &'a Verdict,
    pub run: RunInfo<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunInfo<'a> {
    pub name: &'a str,
    pub elapsed_secs: f64,
    pub incomplete: bool,
    pub empty: bool,
    pub vus_max: u64,
    pub exit_code: i32,
    pub timeline: &'a [ConcurrencyPoint],
}

impl<'a> From<&'a RunReport> for ReportPayload<'a> {
    fn from(report: &'a RunReport) -> Self {
        Self {
            metrics: &report.snapshot.metrics,
            checks: &report.snapshot.checks,
            thresholds_verdict: &report.verdict,
            run: RunInfo {
                name: &report.name,
                elapsed_secs: report.elapsed.as_secs_f64(),
                incomplete: report.incomplete,
                empty: report.empty,
                vus_max: report.vus_max,
                exit_code: report.exit_code().code(),
                timeline: &report.timeline,
            },
        }
    }
}

pub trait Renderer {
    fn render(&self, payload: &ReportPayload<'_>) -> Result<Vec<u8>, ReportError>;
}

/// Pretty-printed JSON of the whole payload.
#[derive(Copy, Clone, Debug, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, payload: &ReportPayload<'_>) -> Result<Vec<u8>, ReportError> {
        Ok(serde_json::to_vec_pretty(payload)?)
    }
}

/// Terminal summary in the layout load testers are used to reading.
#[derive(Copy, Clone, Debug, Default)]
pub struct TextSummary;

const LABEL_WIDTH: usize = 32;

impl Renderer for TextSummary {
    fn render(&self, payload: &ReportPayload<'_>) -> Result<Vec<u8>, ReportError> {
        let mut out = String::new();
        let run = &payload.run;

        let status = match (run.incomplete, run.empty) {
            (_, true) => "no requests issued",
            (true, false) => "aborted",
            (false, false) => "completed",
        };
        writeln!(
            out,
            "  run: {} ({status}), {:.1}s, vus_max={}",
            run.name, run.elapsed_secs, run.vus_max
        )?;
        writeln!(out)?;

        for (name, tally) in payload.checks {
            let mark = if tally.fails == 0 { '✓' } else { '✗' };
            writeln!(
                out,
                "  {mark} {name} ({:.2}% passed, {} / {})",
                pct(tally.passes, tally.total()),
                tally.passes,
                tally.total()
            )?;
        }
        if !payload.checks.is_empty() {
            writeln!(out)?;
        }

        for (name, summary) in payload.metrics {
            let label = format!("{name}{}", ".".repeat(LABEL_WIDTH.saturating_sub(name.len())));
            writeln!(out, "  {label}: {}", describe(name, summary))?;
        }

        if !payload.thresholds_verdict.results.is_empty() {
            writeln!(out)?;
            writeln!(out, "  thresholds:")?;
            for result in &payload.thresholds_verdict.results {
                let mark = if result.passed { '✓' } else { '✗' };
                writeln!(
                    out,
                    "    {mark} {} {} (observed {:.4})",
                    result.metric, result.expression, result.observed
                )?;
            }
        }

        writeln!(out)?;
        let verdict = if payload.thresholds_verdict.overall_passed {
            "PASSED"
        } else {
            "FAILED"
        };
        writeln!(out, "  verdict: {verdict} (exit code {})", run.exit_code)?;

        Ok(out.into_bytes())
    }
}

fn describe(name: &str, summary: &MetricSummary) -> String {
    match summary.kind {
        MetricKind::Trend => {
            let estimated = if summary.estimated { " (estimated)" } else { "" };
            format!(
                "avg={:.2}ms min={:.2}ms med={:.2}ms max={:.2}ms p(90)={:.2}ms p(95)={:.2}ms p(99)={:.2}ms{estimated}",
                summary.avg, summary.min, summary.med, summary.max, summary.p90, summary.p95, summary.p99,
            )
        }
        MetricKind::Rate => format!(
            "{:.2}% ✓ {} ✗ {}",
            summary.rate * 100.,
            summary.sum as u64,
            summary.fails()
        ),
        MetricKind::Counter => format!("{} {:.2}/s", summary.sum, summary.rate),
        MetricKind::Gauge if name.ends_with("_max") => format!("{}", summary.max),
        MetricKind::Gauge => format!(
            "{} min={} max={}",
            summary.value, summary.min, summary.max
        ),
    }
}

fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.
    } else {
        part as f64 / total as f64 * 100.
    }
}

/// Render `payload` and write it to `path`, creating missing parent directories.
pub fn write_report(
    path: &Path,
    renderer: &dyn Renderer,
    payload: &ReportPayload<'_>,
) -> Result<(), ReportError> {
    let bytes = renderer.render(payload)?;
    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, bytes).map_err(io_err)?;

    info!("Report written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::Accumulator;
    use crate::evaluator::evaluate;
    use stampede_core::{CheckResult, RequestOutcome, Threshold};
    use std::time::Duration;

    fn report() -> RunReport {
        let acc = Accumulator::new();
        for i in 0..50 {
            let outcome = RequestOutcome::response(200, Duration::from_millis(100 + i), false)
                .with_checks(vec![CheckResult {
                    name: "status is 200".to_string(),
                    passed: true,
                }]);
            acc.record_outcome(&outcome);
        }
        let snapshot = acc.finalize();
        let thresholds = vec![Threshold::new("http_req_failed", "rate<0.01").unwrap()];
        let verdict = evaluate(&snapshot, &thresholds);

        RunReport {
            name: "report".to_string(),
            snapshot,
            verdict,
            elapsed: Duration::from_secs(5),
            incomplete: false,
            empty: false,
            vus_max: 2,
            timeline: vec![],
        }
    }

    #[test]
    fn json_has_all_sections() {
        let report = report();
        let bytes = JsonRenderer.render(&ReportPayload::from(&report)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["metrics"]["http_reqs"]["count"], 50);
        assert_eq!(value["metrics"]["http_req_failed"]["rate"], 0.0);
        assert_eq!(value["checks"]["status is 200"]["passes"], 50);
        assert_eq!(value["thresholds_verdict"]["overall_passed"], true);
        assert_eq!(value["run"]["exit_code"], 0);
        assert_eq!(value["run"]["incomplete"], false);
    }

    #[test]
    fn text_summary_lists_thresholds() {
        let report = report();
        let bytes = TextSummary.render(&ReportPayload::from(&report)).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.contains("(completed)"));
        assert!(text.contains("✓ status is 200"));
        assert!(text.contains("http_req_duration"));
        assert!(text.contains("✓ http_req_failed rate<0.01"));
        assert!(text.contains("verdict: PASSED"));
    }

    #[test]
    fn writes_into_missing_directories() {
        let dir = std::env::temp_dir().join(format!("stampede-report-{}", std::process::id()));
        let path = dir.join("nested").join("summary.json");

        let report = report();
        write_report(&path, &JsonRenderer, &ReportPayload::from(&report)).unwrap();
        assert!(path.exists());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let report = report();
        let file = std::env::temp_dir().join(format!("stampede-blocker-{}", std::process::id()));
        std::fs::write(&file, b"").unwrap();

        let res = write_report(
            &file.join("summary.json"),
            &JsonRenderer,
            &ReportPayload::from(&report),
        );
        assert!(matches!(res, Err(ReportError::Io { .. })));

        std::fs::remove_file(file).unwrap();
    }
}
