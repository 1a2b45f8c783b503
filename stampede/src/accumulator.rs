//! Thread-safe running statistics for every built-in metric.
//!
//! One [`Accumulator`] is shared (behind an `Arc`) by every virtual user of a run. Concurrency
//! gauges are filled in from the scheduler's timeline once the users are joined. Updates take a single short-lived lock; percentile work is deferred to
//! [`Accumulator::snapshot`] and [`Accumulator::finalize`].
use crate::histogram::{Quantiles, Trend};
use serde::{Serialize, Serializer};
use stampede_core::{
    MetricKind, RequestOutcome, Selector, BUILTIN_METRICS, CHECKS, HTTP_REQS, HTTP_REQ_DURATION,
    HTTP_REQ_FAILED, ITERATIONS, ITERATION_DURATION,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

pub struct Accumulator {
    registry: Mutex<Registry>,
    started: Instant,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            started: Instant::now(),
        }
    }

    /// Record one observation of a registered metric.
    ///
    /// Rates treat any non-zero value as `true`, gauges keep the latest value.
    pub fn record(&self, name: &str, value: f64) {
        match self.lock().metrics.get_mut(name) {
            Some(series) => series.observe(value),
            None => warn!("Dropping observation for unregistered metric `{name}`"),
        }
    }

    /// Record every request metric produced by one iteration under a single lock.
    pub fn record_outcome(&self, outcome: &RequestOutcome) {
        let mut registry = self.lock();
        registry.observe(HTTP_REQS, 1.);
        registry.observe(HTTP_REQ_DURATION, millis(outcome.duration));
        registry.observe(HTTP_REQ_FAILED, bool_value(outcome.failed));

        for check in &outcome.checks {
            registry.observe(CHECKS, bool_value(check.passed));
            let tally = registry.checks.entry(check.name.clone()).or_default();
            if check.passed {
                tally.passes += 1;
            } else {
                tally.fails += 1;
            }
        }
    }

    /// Record the end of an iteration, think-time included.
    pub fn record_iteration(&self, duration: Duration) {
        let mut registry = self.lock();
        registry.observe(ITERATIONS, 1.);
        registry.observe(ITERATION_DURATION, millis(duration));
    }

    /// Register check names up front so checks that never ran still show in reports.
    pub fn register_checks<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let mut registry = self.lock();
        for name in names {
            registry.checks.entry(name.to_string()).or_default();
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Point-in-time view of all metrics. The run keeps going.
    pub fn snapshot(&self) -> MetricSnapshot {
        let elapsed = self.elapsed();
        let registry = self.lock();
        registry.summarize(elapsed)
    }

    /// Consume the accumulator once every virtual user has been joined.
    pub fn finalize(self) -> MetricSnapshot {
        let elapsed = self.elapsed();
        let registry = self
            .registry
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        registry.summarize(elapsed)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A panicking virtual user must not take the run's metrics down with it.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

struct Registry {
    metrics: BTreeMap<&'static str, Series>,
    checks: BTreeMap<String, CheckTally>,
}

impl Registry {
    fn new() -> Self {
        let metrics = BUILTIN_METRICS
            .iter()
            .map(|(name, kind)| (*name, Series::new(*kind)))
            .collect();

        Self {
            metrics,
            checks: BTreeMap::new(),
        }
    }

    fn observe(&mut self, name: &'static str, value: f64) {
        if let Some(series) = self.metrics.get_mut(name) {
            series.observe(value);
        }
    }

    fn summarize(&self, elapsed: Duration) -> MetricSnapshot {
        let metrics = self
            .metrics
            .iter()
            .map(|(name, series)| (name.to_string(), series.summarize(elapsed)))
            .collect();

        MetricSnapshot {
            elapsed,
            metrics,
            checks: self.checks.clone(),
        }
    }
}

#[derive(Debug)]
enum Series {
    Counter { count: u64, sum: f64 },
    Rate { trues: u64, total: u64 },
    Trend(Trend),
    Gauge { value: f64, min: f64, max: f64, count: u64 },
}

impl Series {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Series::Counter { count: 0, sum: 0. },
            MetricKind::Rate => Series::Rate { trues: 0, total: 0 },
            MetricKind::Trend => Series::Trend(Trend::new()),
            MetricKind::Gauge => Series::Gauge {
                value: 0.,
                min: 0.,
                max: 0.,
                count: 0,
            },
        }
    }

    fn observe(&mut self, value: f64) {
        match self {
            Series::Counter { count, sum } => {
                *count += 1;
                *sum += value;
            }
            Series::Rate { trues, total } => {
                *total += 1;
                if value != 0. {
                    *trues += 1;
                }
            }
            Series::Trend(trend) => trend.insert(value),
            Series::Gauge {
                value: current,
                min,
                max,
                count,
            } => {
                if *count == 0 {
                    *min = value;
                    *max = value;
                } else {
                    *min = min.min(value);
                    *max = max.max(value);
                }
                *current = value;
                *count += 1;
            }
        }
    }

    fn summarize(&self, elapsed: Duration) -> MetricSummary {
        match self {
            Series::Counter { count, sum } => {
                let secs = elapsed.as_secs_f64();
                MetricSummary {
                    count: *count,
                    sum: *sum,
                    rate: if secs > 0. { sum / secs } else { 0. },
                    ..MetricSummary::empty(MetricKind::Counter)
                }
            }
            Series::Rate { trues, total } => MetricSummary {
                count: *total,
                sum: *trues as f64,
                rate: if *total == 0 {
                    0.
                } else {
                    *trues as f64 / *total as f64
                },
                ..MetricSummary::empty(MetricKind::Rate)
            },
            Series::Trend(trend) => {
                let quantiles = trend.quantiles();
                MetricSummary {
                    count: trend.count(),
                    sum: trend.sum(),
                    min: trend.min(),
                    max: trend.max(),
                    avg: trend.mean(),
                    med: quantiles.percentile(50.),
                    p90: quantiles.percentile(90.),
                    p95: quantiles.percentile(95.),
                    p99: quantiles.percentile(99.),
                    estimated: trend.is_estimated(),
                    quantiles: Some(quantiles),
                    ..MetricSummary::empty(MetricKind::Trend)
                }
            }
            Series::Gauge {
                value,
                min,
                max,
                count,
            } => MetricSummary {
                count: *count,
                value: *value,
                min: *min,
                max: *max,
                ..MetricSummary::empty(MetricKind::Gauge)
            },
        }
    }
}

/// Final or live statistics of one metric. Fields that do not apply to the metric's kind are 0.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub kind: MetricKind,
    pub count: u64,
    pub sum: f64,
    pub rate: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub value: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
    #[serde(skip)]
    quantiles: Option<Quantiles>,
}

impl MetricSummary {
    fn empty(kind: MetricKind) -> Self {
        Self {
            kind,
            count: 0,
            sum: 0.,
            rate: 0.,
            min: 0.,
            max: 0.,
            avg: 0.,
            med: 0.,
            p90: 0.,
            p95: 0.,
            p99: 0.,
            value: 0.,
            estimated: false,
            quantiles: None,
        }
    }

    /// The value a threshold selector reads from this summary, if the selector applies.
    pub fn statistic(&self, selector: Selector) -> Option<f64> {
        if !selector.accepts(self.kind) {
            return None;
        }

        let value = match selector {
            Selector::Percentile(pct) => self
                .quantiles
                .as_ref()
                .map_or(0., |q| q.percentile(pct)),
            Selector::Avg => self.avg,
            Selector::Min => self.min,
            Selector::Max => self.max,
            Selector::Med => self.med,
            Selector::Count => match self.kind {
                MetricKind::Counter => self.sum,
                _ => self.count as f64,
            },
            Selector::Rate => self.rate,
            Selector::Value => self.value,
            Selector::Sum => self.sum,
        };
        Some(value)
    }

    /// Failed observations of a rate metric.
    pub fn fails(&self) -> u64 {
        self.count.saturating_sub(self.sum as u64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckTally {
    pub passes: u64,
    pub fails: u64,
}

impl CheckTally {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

/// Immutable view of every metric at one point of a run.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub metrics: BTreeMap<String, MetricSummary>,
    pub checks: BTreeMap<String, CheckTally>,
}

impl MetricSnapshot {
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    pub fn total_requests(&self) -> u64 {
        self.metric(HTTP_REQS).map_or(0, |m| m.count)
    }
}

fn as_secs<S: Serializer>(dur: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(dur.as_secs_f64())
}

fn millis(dur: Duration) -> f64 {
    dur.as_secs_f64() * 1_000.
}

fn bool_value(b: bool) -> f64 {
    if b {
        1.
    } else {
        0.
    }
}
