use pdatastructs::tdigest::{TDigest, K1};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Samples per trend kept verbatim before switching to a t-digest.
pub const EXACT_SAMPLE_LIMIT: usize = 100_000;

const TDIGEST_COMPRESSION: f64 = 100.;
const TDIGEST_BACKLOG_SIZE: usize = 100;
// Resolution of the quantile table frozen out of a digest.
const SKETCH_POINTS: usize = 1_000;

/// Running distribution of a trend metric.
///
/// Values are stored exactly up to [`EXACT_SAMPLE_LIMIT`]; past that they are folded into a
/// t-digest and percentile queries become estimates, always clamped to the observed range.
#[derive(Debug, Clone)]
pub(crate) struct Trend {
    samples: Vec<f64>,
    digest: Option<TDigest<K1>>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Trend {
    pub fn new() -> Self {
        Self {
            samples: vec![],
            digest: None,
            count: 0,
            sum: 0.,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn insert(&mut self, value: f64) {
        if !value.is_finite() {
            warn!("Dropping non-finite trend sample {value}");
            return;
        }

        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        match &mut self.digest {
            Some(digest) => digest.insert(value),
            None => {
                self.samples.push(value);
                if self.samples.len() > EXACT_SAMPLE_LIMIT {
                    self.spill();
                }
            }
        }
    }

    fn spill(&mut self) {
        debug!(
            "Trend exceeded {EXACT_SAMPLE_LIMIT} samples, switching to t-digest estimates"
        );
        let mut digest = default_tdigest();
        for value in self.samples.drain(..) {
            digest.insert(value);
        }
        self.samples = vec![];
        self.digest = Some(digest);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.max
        }
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn is_estimated(&self) -> bool {
        self.digest.is_some()
    }

    /// Freeze the current distribution for percentile queries.
    pub fn quantiles(&self) -> Quantiles {
        match &self.digest {
            Some(digest) => self.sketch(digest),
            None => {
                let mut points = self.samples.clone();
                points.sort_by(f64::total_cmp);
                Quantiles { points }
            }
        }
    }

    fn sketch(&self, digest: &TDigest<K1>) -> Quantiles {
        let mut points = Vec::with_capacity(SKETCH_POINTS + 1);
        points.push(self.min);

        let mut floor = self.min;
        for i in 1..SKETCH_POINTS {
            let q = i as f64 / SKETCH_POINTS as f64;
            let estimate = digest.quantile(q);

            // TDigest occasionally returns NaN; fall back to the mean for that point.
            let estimate = if estimate.is_finite() {
                estimate
            } else {
                error!("NaN t-digest estimate at q={q}, using the mean");
                self.mean()
            };

            floor = estimate.clamp(floor, self.max);
            points.push(floor);
        }

        points.push(self.max);
        Quantiles { points }
    }
}

/// A frozen, sorted view of a trend answering `quantile(q)` for `q` in `[0, 1]`.
///
/// In exact mode the points are the samples themselves; in estimated mode they are an evenly
/// spaced quantile table taken from the digest. Both are interpolated the same way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quantiles {
    points: Vec<f64>,
}

impl Quantiles {
    pub fn quantile(&self, q: f64) -> f64 {
        let Some(last) = self.points.len().checked_sub(1) else {
            return 0.;
        };

        let rank = q.clamp(0., 1.) * last as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        let weight = rank - lo as f64;

        self.points[lo] + (self.points[hi] - self.points[lo]) * weight
    }

    pub fn percentile(&self, pct: f64) -> f64 {
        self.quantile(pct / 100.)
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(TDIGEST_COMPRESSION), TDIGEST_BACKLOG_SIZE)
}
