//! Staged concurrency control.
//!
//! On every control tick the scheduler reads the desired user count off the [`StageProfile`] and
//! spawns or retires virtual users to match it. Retiring is cooperative: a retired user finishes
//! its in-flight iteration, so the number of users still running may lag the target on the way
//! down.
use crate::timer::ControlTick;
use crate::transport::Transport;
use crate::vu::{self, VirtualUser, Workload};
use serde::{Serialize, Serializer};
use stampede_core::StageProfile;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// One control-tick sample of the run's concurrency.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConcurrencyPoint {
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
    /// What the profile asked for.
    pub desired: u64,
    /// Users not asked to stop.
    pub live: u64,
    /// Users whose task has not finished yet, stopping ones included.
    pub active: u64,
}

#[derive(Clone, Debug)]
pub struct ScheduleOutcome {
    pub aborted: bool,
    pub elapsed: Duration,
    pub vus_max: u64,
    pub timeline: Vec<ConcurrencyPoint>,
}

pub(crate) struct Scheduler<T> {
    profile: StageProfile,
    workload: Arc<Workload<T>>,
    tick: Duration,
    abort: CancellationToken,
    tracker: TaskTracker,
    // Spawn order; the newest users are retired first.
    users: Vec<VirtualUser>,
    next_id: u64,
    vus_max: u64,
    stage: Option<usize>,
    timeline: Vec<ConcurrencyPoint>,
}

impl<T> Scheduler<T>
where
    T: Transport + Sync + 'static,
{
    pub fn new(
        profile: StageProfile,
        workload: Arc<Workload<T>>,
        tick: Duration,
        abort: CancellationToken,
    ) -> Self {
        Self {
            profile,
            workload,
            tick,
            abort,
            tracker: TaskTracker::new(),
            users: vec![],
            next_id: 0,
            vus_max: 0,
            stage: None,
            timeline: vec![],
        }
    }

    /// Drive the whole profile, then stop and join every user.
    pub async fn run(mut self) -> ScheduleOutcome {
        let start = Instant::now();
        let mut tick = ControlTick::new(self.tick);
        let deadline = tokio::time::sleep_until(start + self.profile.total_duration());
        tokio::pin!(deadline);

        debug!(
            "Scheduling {} stages over {} with a {tick} control tick",
            self.profile.stages().len(),
            humantime::format_duration(self.profile.total_duration()),
        );

        // NOTE: Ordering matters. An abort wins over the deadline, which wins over a tick due at
        // the same instant.
        let aborted = loop {
            tokio::select! {
                biased;
                _ = self.abort.cancelled() => break true,
                _ = &mut deadline => break false,
                _ = tick.tick() => {
                    let elapsed = start.elapsed();
                    self.track_stage(elapsed);
                    let desired = self.profile.target_at(elapsed);
                    self.set_concurrency(desired);
                    self.sample(elapsed, desired);
                }
            }
        };

        if aborted {
            warn!(
                "Run aborted after {}, stopping {} users",
                humantime::format_duration(start.elapsed()),
                self.users.len()
            );
        }

        self.set_concurrency(0);
        self.tracker.close();
        self.tracker.wait().await;

        let elapsed = start.elapsed();
        self.sample(elapsed, 0);
        debug!(
            "All users joined after {}",
            humantime::format_duration(elapsed)
        );

        ScheduleOutcome {
            aborted,
            elapsed,
            vus_max: self.vus_max,
            timeline: std::mem::take(&mut self.timeline),
        }
    }

    fn set_concurrency(&mut self, desired: u64) {
        let live = self.users.len() as u64;
        if desired > live {
            for _ in live..desired {
                self.spawn_user();
            }
            trace!("Spawned {} users", desired - live);
        } else if desired < live {
            // Truncation is safe: desired < live <= usize::MAX.
            for user in self.users.drain(desired as usize..).rev() {
                user.stop();
            }
            trace!("Retiring {} users", live - desired);
        }
    }

    fn track_stage(&mut self, elapsed: Duration) {
        let stage = self.profile.stage_index_at(elapsed);
        if stage == self.stage {
            return;
        }
        self.stage = stage;

        if let Some(idx) = stage {
            debug!(
                "Entering stage {} of {} at {}, target {} users",
                idx + 1,
                self.profile.stages().len(),
                humantime::format_duration(elapsed),
                self.profile.stages()[idx].target,
            );
        }
    }

    fn spawn_user(&mut self) {
        let user = VirtualUser::new(self.next_id, self.abort.child_token());
        self.next_id += 1;

        self.tracker
            .spawn(vu::run_until_stopped(user.clone(), self.workload.clone()));
        self.users.push(user);
    }

    fn sample(&mut self, elapsed: Duration, desired: u64) {
        let live = self.users.len() as u64;
        let active = self.tracker.len() as u64;
        self.vus_max = self.vus_max.max(active);

        #[cfg(feature = "metrics")]
        metrics::gauge!("stampede_vus").set(active as f64);

        self.timeline.push(ConcurrencyPoint {
            elapsed,
            desired,
            live,
            active,
        });
    }
}

fn as_secs<S: Serializer>(dur: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(dur.as_secs_f64())
}
