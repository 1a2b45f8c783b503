use crate::accumulator::MetricSnapshot;
use stampede_core::{Threshold, ThresholdResult, Verdict};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Judge every threshold against a snapshot.
///
/// Pure: the same snapshot and thresholds always give the same verdict. A threshold whose
/// statistic cannot be read fails with an observed value of 0.
pub fn evaluate(snapshot: &MetricSnapshot, thresholds: &[Threshold]) -> Verdict {
    let results = thresholds
        .iter()
        .map(|threshold| {
            let statistic = snapshot
                .metric(&threshold.metric)
                .and_then(|summary| summary.statistic(threshold.selector));

            let (observed, passed) = match statistic {
                Some(observed) if observed.is_finite() => (observed, threshold.passes(observed)),
                _ => {
                    error!(
                        "No usable `{}` value for `{}`, failing the threshold",
                        threshold.selector, threshold.metric
                    );
                    (0., false)
                }
            };

            if !passed {
                debug!(
                    "Threshold {} `{}` failed with {observed}",
                    threshold.metric, threshold.expression
                );
            }

            ThresholdResult {
                metric: threshold.metric.clone(),
                expression: threshold.expression.clone(),
                observed,
                passed,
            }
        })
        .collect();

    Verdict::new(results)
}
