use std::time::Duration;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

/// Fixed-period clock driving scheduler adjustments.
///
/// The first tick completes immediately so the initial concurrency is applied at `t = 0`.
/// Ticks missed because the runtime was busy are delayed rather than bursted.
pub(crate) struct ControlTick {
    interval: Interval,
    interval_dur: Duration,
}

impl ControlTick {
    pub fn new(interval_dur: Duration) -> Self {
        let mut interval = interval(interval_dur);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            interval_dur,
        }
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

impl std::fmt::Display for ControlTick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", humantime::format_duration(self.interval_dur))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate() {
        let start = Instant::now();
        let mut tick = ControlTick::new(Duration::from_secs(1));

        tick.tick().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        tick.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(tick.to_string(), "1s");
    }
}
