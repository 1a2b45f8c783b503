//! Virtual users: the request loop each spawned task runs until told to stop.
use crate::accumulator::Accumulator;
use crate::transport::{HttpRequest, Transport};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use stampede_core::{
    Check, Exchange, RequestOutcome, RunConfig, StatusRange, ThinkTime, TransportErrorKind,
};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum VuState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl VuState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => VuState::Idle,
            1 => VuState::Running,
            2 => VuState::Stopping,
            _ => VuState::Stopped,
        }
    }
}

/// Handle on one virtual user, shared between the scheduler and the user's task.
#[derive(Clone, Debug)]
pub struct VirtualUser {
    id: u64,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl VirtualUser {
    pub(crate) fn new(id: u64, cancel: CancellationToken) -> Self {
        Self {
            id,
            state: Arc::new(AtomicU8::new(VuState::Idle as u8)),
            cancel,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> VuState {
        let raw = self.state.load(Ordering::Acquire);
        // A user cancelled through the run-wide token never had `stop` called on it.
        match VuState::from_u8(raw) {
            VuState::Idle | VuState::Running if self.cancel.is_cancelled() => VuState::Stopping,
            state => state,
        }
    }

    /// Ask the user to stop after its in-flight iteration.
    pub fn stop(&self) {
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
            match VuState::from_u8(raw) {
                VuState::Idle | VuState::Running => Some(VuState::Stopping as u8),
                _ => None,
            }
        });
        self.cancel.cancel();
    }

    fn start(&self) {
        let _ = self.state.compare_exchange(
            VuState::Idle as u8,
            VuState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn finish(&self) {
        self.state.store(VuState::Stopped as u8, Ordering::Release);
    }
}

/// Everything an iteration needs, shared by all users of a run.
pub(crate) struct Workload<T> {
    transport: Arc<T>,
    accumulator: Arc<Accumulator>,
    request: HttpRequest,
    checks: Vec<Check>,
    think_time: ThinkTime,
    expected_status: StatusRange,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl<T> Workload<T>
where
    T: Transport + Sync + 'static,
{
    pub fn new(transport: Arc<T>, accumulator: Arc<Accumulator>, config: &RunConfig) -> Self {
        Self {
            transport,
            accumulator,
            request: HttpRequest::from_config(config),
            checks: config.checks.clone(),
            think_time: config.think_time,
            expected_status: config.expected_status,
            limiter: config.max_rps.map(rate_limiter),
        }
    }

    #[cfg(test)]
    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    async fn issue(&self) -> RequestOutcome {
        let start = Instant::now();
        let res = tokio::time::timeout(self.request.timeout, self.transport.issue(&self.request))
            .await;

        match res {
            Ok(Ok(response)) => {
                let exchange = Exchange {
                    status: response.status,
                    duration: response.duration,
                    body: response.body.as_deref(),
                    error: None,
                };
                let failed = !self.expected_status.contains(response.status);
                RequestOutcome::response(response.status, response.duration, failed)
                    .with_checks(self.run_checks(&exchange))
            }
            Ok(Err(err)) => {
                debug!("Request to {} failed: {err}", self.request.url);
                self.transport_failure(err.kind(), start.elapsed())
            }
            Err(_) => {
                debug!(
                    "Request to {} timed out after {}",
                    self.request.url,
                    humantime::format_duration(self.request.timeout)
                );
                self.transport_failure(TransportErrorKind::Timeout, start.elapsed())
            }
        }
    }

    fn transport_failure(&self, kind: TransportErrorKind, duration: Duration) -> RequestOutcome {
        let outcome = RequestOutcome::transport_failure(kind, duration);
        let exchange = Exchange {
            status: outcome.status,
            duration,
            body: None,
            error: Some(kind),
        };
        let checks = self.run_checks(&exchange);
        outcome.with_checks(checks)
    }

    fn run_checks(&self, exchange: &Exchange<'_>) -> Vec<stampede_core::CheckResult> {
        self.checks.iter().map(|check| check.run(exchange)).collect()
    }

    fn think_time(&self, rng: &mut SmallRng) -> Duration {
        match self.think_time {
            ThinkTime::Fixed(pause) => pause,
            ThinkTime::Uniform { min, max } if min < max => rng.gen_range(min..=max),
            ThinkTime::Uniform { min, .. } => min,
        }
    }
}

/// Run iterations until `user` is stopped, then mark it `Stopped`.
///
/// The stop flag is checked between iterations only: a request in flight always completes (or
/// times out) and is recorded. Rate-limiter waits and think-time end early on stop.
pub(crate) async fn run_until_stopped<T>(user: VirtualUser, workload: Arc<Workload<T>>)
where
    T: Transport + Sync + 'static,
{
    user.start();
    trace!("Virtual user {} started", user.id);

    let mut rng = SmallRng::from_entropy();
    while !user.cancel.is_cancelled() {
        let started = Instant::now();

        if let Some(limiter) = &workload.limiter {
            tokio::select! {
                biased;
                _ = user.cancel.cancelled() => break,
                _ = limiter.until_ready() => {},
            }
        }

        let outcome = workload.issue().await;
        workload.accumulator.record_outcome(&outcome);
        #[cfg(feature = "metrics")]
        emit_metrics(&outcome);

        let pause = workload.think_time(&mut rng);
        if pause.is_zero() {
            // Keep a fast-failing transport from starving the scheduler.
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = user.cancel.cancelled() => {},
                _ = tokio::time::sleep(pause) => {},
            }
        }

        workload.accumulator.record_iteration(started.elapsed());
    }

    user.finish();
    trace!("Virtual user {} stopped", user.id);
}

#[cfg(feature = "metrics")]
fn emit_metrics(outcome: &RequestOutcome) {
    metrics::counter!("stampede_http_reqs").increment(1);
    if outcome.failed {
        metrics::counter!("stampede_http_req_failed").increment(1);
    }
    metrics::histogram!("stampede_http_req_duration").record(outcome.duration.as_secs_f64());
}

fn rate_limiter(rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(rps).allow_burst(NonZeroU32::MIN))
}
