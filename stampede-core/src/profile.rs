use crate::{ConfigError, Stage};
use std::time::Duration;

/// Desired concurrency as a function of elapsed run time.
///
/// Within a stage the target moves linearly from the previous stage's target (or `start_vus` for
/// the first stage) to the stage's own target, rounded to the nearest whole user. A stage whose
/// target equals the previous one is a hold. Zero-length stages are instantaneous jumps.
#[derive(Clone, Debug, PartialEq)]
pub struct StageProfile {
    start_vus: u64,
    stages: Vec<Stage>,
    total: Duration,
}

impl StageProfile {
    pub fn new(start_vus: u64, stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        let total: Duration = stages.iter().map(|s| s.duration).sum();
        if total.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }

        Ok(Self {
            start_vus,
            stages,
            total,
        })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    pub fn max_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
            .max(self.start_vus)
    }

    /// Desired number of virtual users at `elapsed`. Zero once the profile is over.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let mut stage_start = Duration::ZERO;
        let mut prev_target = self.start_vus;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let diff = stage.target as f64 - prev_target as f64;
                return (prev_target as f64 + diff * progress).round() as u64;
            }
            stage_start = stage_end;
            prev_target = stage.target;
        }

        0
    }

    /// Index of the stage running at `elapsed`, if the profile is not over.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return Some(idx);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn scenario_a() -> StageProfile {
        StageProfile::new(
            0,
            vec![
                Stage::new(secs(30), 20),
                Stage::new(secs(60), 20),
                Stage::new(secs(30), 0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn ramps_linearly() {
        let profile = scenario_a();
        assert_eq!(profile.target_at(secs(0)), 0);
        assert_eq!(profile.target_at(secs(15)), 10);
        assert_eq!(profile.target_at(Duration::from_millis(29_999)), 20);
        assert_eq!(profile.target_at(secs(45)), 20);
        assert_eq!(profile.target_at(secs(105)), 10);
        assert_eq!(profile.target_at(secs(120)), 0);
        assert_eq!(profile.target_at(secs(500)), 0);
    }

    #[test]
    fn continuous_at_stage_boundaries() {
        let profile = StageProfile::new(
            3,
            vec![
                Stage::new(secs(10), 10),
                Stage::new(secs(20), 50),
                Stage::new(secs(7), 4),
                Stage::new(secs(13), 4),
                Stage::new(secs(9), 31),
            ],
        )
        .unwrap();

        let mut boundary = Duration::ZERO;
        for pair in profile.stages().windows(2) {
            boundary += pair[0].duration;
            assert_eq!(profile.target_at(boundary), pair[0].target);

            let just_before = boundary - Duration::from_micros(1);
            assert_eq!(profile.target_at(just_before), pair[0].target);
        }
    }

    #[test]
    fn hold_stage_is_constant() {
        let profile = scenario_a();
        for s in 30..90 {
            assert_eq!(profile.target_at(secs(s)), 20);
        }
    }

    #[test]
    fn zero_length_stage_is_a_jump() {
        let profile = StageProfile::new(
            0,
            vec![Stage::new(Duration::ZERO, 8), Stage::new(secs(10), 8)],
        )
        .unwrap();
        assert_eq!(profile.target_at(secs(0)), 8);
        assert_eq!(profile.target_at(secs(5)), 8);
        assert_eq!(profile.stage_index_at(secs(0)), Some(1));
    }

    #[test]
    fn rejects_degenerate_profiles() {
        assert_eq!(StageProfile::new(0, vec![]), Err(ConfigError::NoStages));
        assert_eq!(
            StageProfile::new(0, vec![Stage::new(Duration::ZERO, 10)]),
            Err(ConfigError::ZeroDuration)
        );
    }

    #[test]
    fn reports_stage_index_and_peak() {
        let profile = scenario_a();
        assert_eq!(profile.stage_index_at(secs(0)), Some(0));
        assert_eq!(profile.stage_index_at(secs(30)), Some(1));
        assert_eq!(profile.stage_index_at(secs(119)), Some(2));
        assert_eq!(profile.stage_index_at(secs(120)), None);
        assert_eq!(profile.max_target(), 20);
    }
}
