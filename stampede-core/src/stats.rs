use serde::Serialize;

/// Outcome of a single threshold against the final metrics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: f64,
    pub passed: bool,
}

/// Pass/fail decision for a whole run. Built once, at run end.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Verdict {
    pub results: Vec<ThresholdResult>,
    pub overall_passed: bool,
}

impl Verdict {
    pub fn new(results: Vec<ThresholdResult>) -> Self {
        let overall_passed = results.iter().all(|r| r.passed);
        Self {
            results,
            overall_passed,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}
