//! HTTP endpoints with controllable latency and failure behaviour, used as a load test target.
use axum::{
    debug_handler,
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
    Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lazy_static::lazy_static;
use metrics::counter;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tower_http::trace::TraceLayer;
use tracing::debug;

pub fn router() -> Router {
    Router::new()
        .route("/delay/ms/:delay_ms", get(delay))
        .route("/jitter/ms/:mean_ms/:std_ms", get(jitter))
        .route("/status/:code", get(status))
        .route("/body/:text", get(body))
        .route(
            "/flaky/:every/delay/ms/:delay_ms/scenario/:scenario_name",
            get(flaky),
        )
        .route(
            "/max/:max_rps/delay/ms/:delay_ms/scenario/:scenario_name",
            get(max),
        )
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    debug!("Mock service listening on {addr}");
    axum::serve(listener, router()).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct DelayQuery {
    #[serde(default)]
    delay_ms: u64,
}

#[debug_handler]
pub async fn delay(Path(delay_ms): Path<u64>) {
    measure();
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

#[debug_handler]
pub async fn jitter(Path((mean_ms, std_ms)): Path<(f64, f64)>) -> Result<(), StatusCode> {
    measure();
    let normal = Normal::new(mean_ms, std_ms).map_err(|_| StatusCode::BAD_REQUEST)?;
    let ms = normal.sample(&mut rand::thread_rng()).max(0.);
    tokio::time::sleep(Duration::from_secs_f64(ms / 1_000.)).await;
    Ok(())
}

#[debug_handler]
pub async fn status(Path(code): Path<u16>, Query(query): Query<DelayQuery>) -> StatusCode {
    measure();
    tokio::time::sleep(Duration::from_millis(query.delay_ms)).await;
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

#[debug_handler]
pub async fn body(Path(text): Path<String>) -> String {
    measure();
    text
}

lazy_static! {
    static ref FLAKY_MAP: RwLock<HashMap<String, Arc<AtomicU64>>> = RwLock::new(HashMap::new());
}

/// Every `every`-th request of a scenario answers 500.
#[debug_handler]
pub async fn flaky(
    Path((every, delay_ms, scenario_name)): Path<(u64, u64, String)>,
) -> Result<(), StatusCode> {
    measure();
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    let read = FLAKY_MAP
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&scenario_name)
        .cloned();
    let counter = match read {
        Some(counter) => counter,
        None => FLAKY_MAP
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(scenario_name)
            .or_default()
            .clone(),
    };

    let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
    if every > 0 && n % every == 0 {
        debug!("MOCK SERVER ___ FLAKY ERR");
        Err(StatusCode::INTERNAL_SERVER_ERROR)
    } else {
        Ok(())
    }
}

lazy_static! {
    static ref MAX_MAP: RwLock<HashMap<String, Arc<DefaultDirectRateLimiter>>> =
        RwLock::new(HashMap::new());
}

/// Requests above `max_rps` for a scenario answer 500.
#[debug_handler]
pub async fn max(
    Path((max_rps, delay_ms, scenario_name)): Path<(u32, u64, String)>,
) -> Result<(), StatusCode> {
    measure();
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    let max_rps = NonZeroU32::new(max_rps).ok_or(StatusCode::BAD_REQUEST)?;
    let read = MAX_MAP
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&scenario_name)
        .cloned();
    let limiter = match read {
        Some(limiter) => limiter,
        None => MAX_MAP
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(scenario_name)
            .or_insert_with(|| Arc::new(rate_limiter(max_rps)))
            .clone(),
    };

    limiter.check().map_err(|_| {
        debug!("MOCK SERVER ___ LIMITED");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub fn rate_limiter(rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(rps))
}

/** RPS Printer **/

static RPS_MEASURE: AtomicU64 = AtomicU64::new(0);

fn measure() {
    counter!("mock-server.requests").increment(1);
    RPS_MEASURE.fetch_add(1, Ordering::Relaxed);
}

pub async fn rps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let requests = RPS_MEASURE.swap(0, Ordering::Relaxed);
        println!("{requests} RPS");
    }
}
