mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;
    use stampede::core::{HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED};
    use stampede::prelude::*;
    use std::num::NonZeroU32;
    use std::time::Duration;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn short_profile() -> Vec<Stage> {
        vec![
            Stage::new(secs(2), 5),
            Stage::new(secs(4), 5),
            Stage::new(secs(2), 0),
        ]
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn healthy_endpoint_passes() -> anyhow::Result<()> {
        init().await;

        let report = LoadTest::new(&url("/delay/ms/20"), HttpTransport::new())
            .name("healthy")
            .stages(short_profile())
            .think_time(ThinkTime::Fixed(Duration::from_millis(100)))
            .threshold("http_req_failed", "rate<0.01")
            .threshold("http_req_duration", "p(95)<500ms")
            .check(Check::status_equals("status is 200", 200))
            .await?;

        assert!(report.verdict.overall_passed, "{:?}", report.verdict);
        assert_eq!(report.exit_code(), ExitCode::Passed);
        assert_eq!(report.vus_max, 5);
        assert!(report.snapshot.total_requests() > 50);

        let duration = report.snapshot.metric(HTTP_REQ_DURATION).unwrap();
        assert!(duration.med >= 20.);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flaky_endpoint_fails_thresholds() -> anyhow::Result<()> {
        init().await;

        let report = LoadTest::new(
            &url("/flaky/50/delay/ms/5/scenario/flaky_staged"),
            HttpTransport::new(),
        )
        .stages(short_profile())
        .think_time(ThinkTime::Fixed(Duration::from_millis(20)))
        .threshold("http_req_failed", "rate<0.01")
        .await?;

        let failed = report.snapshot.metric(HTTP_REQ_FAILED).unwrap();
        assert!(failed.rate > 0.01 && failed.rate < 0.03, "rate {}", failed.rate);
        assert_eq!(report.exit_code(), ExitCode::ThresholdsFailed);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_endpoint_counts_transport_failures() -> anyhow::Result<()> {
        init().await;

        // Nothing listens on the discard port.
        let report = LoadTest::new("http://127.0.0.1:9/", HttpTransport::new())
            .stages(vec![Stage::new(secs(2), 2)])
            .think_time(ThinkTime::Fixed(Duration::from_millis(200)))
            .request_timeout(secs(1))
            .threshold("http_req_failed", "rate<0.01")
            .check(Check::status_equals("status is 200", 200))
            .await?;

        let failed = report.snapshot.metric(HTTP_REQ_FAILED).unwrap();
        assert_eq!(failed.rate, 1.);
        assert_eq!(report.snapshot.checks["status is 200"].passes, 0);
        assert_eq!(report.exit_code(), ExitCode::ThresholdsFailed);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn abort_reports_partial_run() -> anyhow::Result<()> {
        init().await;

        let test = LoadTest::new(&url("/delay/ms/10"), HttpTransport::new())
            .stages(vec![Stage::new(secs(0), 3), Stage::new(secs(60), 3)])
            .think_time(ThinkTime::Fixed(Duration::from_millis(50)))
            .threshold("http_reqs", "count>0");
        let abort = test.abort_handle();

        let handle = tokio::spawn(test);
        tokio::time::sleep(secs(2)).await;
        abort.cancel();

        let report = handle.await??;
        assert!(report.incomplete);
        assert!(report.elapsed < secs(10));
        assert!(report.snapshot.metric(HTTP_REQS).unwrap().count > 0);
        assert_eq!(report.exit_code(), ExitCode::Passed);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn report_is_written_as_json() -> anyhow::Result<()> {
        init().await;

        let report = LoadTest::new(&url("/body/hello"), HttpTransport::new())
            .stages(vec![Stage::new(secs(1), 2)])
            .check(Check::body_contains("says hello", "hello"))
            .await?;

        let path = std::env::temp_dir()
            .join(format!("stampede-it-{}", std::process::id()))
            .join("summary.json");
        write_report(&path, &JsonRenderer, &ReportPayload::from(&report))?;

        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        assert_eq!(value["checks"]["says hello"]["fails"], 0);
        assert!(value["metrics"]["http_reqs"]["count"].as_u64().unwrap() > 0);
        assert_eq!(value["run"]["incomplete"], false);

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_errors_fail_every_request() -> anyhow::Result<()> {
        init().await;

        let report = LoadTest::new(&url("/status/500?delay_ms=5"), HttpTransport::new())
            .stages(vec![Stage::new(secs(2), 2)])
            .think_time(ThinkTime::Fixed(Duration::from_millis(100)))
            .threshold("http_req_failed", "rate<0.01")
            .check(Check::status_equals("status is 200", 200))
            .await?;

        let failed = report.snapshot.metric(HTTP_REQ_FAILED).unwrap();
        assert!(failed.count > 0);
        assert_eq!(failed.rate, 1.);
        assert_eq!(report.snapshot.checks["status is 200"].passes, 0);
        assert_eq!(report.exit_code(), ExitCode::ThresholdsFailed);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn widened_expected_status_accepts_not_found() -> anyhow::Result<()> {
        init().await;

        let report = LoadTest::new(&url("/status/404"), HttpTransport::new())
            .stages(vec![Stage::new(secs(2), 2)])
            .think_time(ThinkTime::Fixed(Duration::from_millis(100)))
            .expected_status(200, 499)
            .threshold("http_req_failed", "rate<0.01")
            .await?;

        assert_eq!(report.snapshot.metric(HTTP_REQ_FAILED).unwrap().rate, 0.);
        assert_eq!(report.exit_code(), ExitCode::Passed);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn jittered_latency_lands_in_the_trend() -> anyhow::Result<()> {
        init().await;

        let report = LoadTest::new(&url("/jitter/ms/40/5"), HttpTransport::new())
            .stages(vec![Stage::new(secs(3), 3)])
            .think_time(ThinkTime::Fixed(Duration::from_millis(50)))
            .threshold("http_req_duration", "p(95)<500ms")
            .await?;

        let duration = report.snapshot.metric(HTTP_REQ_DURATION).unwrap();
        assert!(duration.med >= 20. && duration.med < 200., "med {}", duration.med);
        assert!(duration.min <= duration.med && duration.med <= duration.max);
        assert_eq!(report.exit_code(), ExitCode::Passed);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_rate_limit_stays_under_server_limit() -> anyhow::Result<()> {
        init().await;

        // The server answers 500 above 20 rps; the users are capped at 10 rps in total.
        let report = LoadTest::new(
            &url("/max/20/delay/ms/1/scenario/client_limited"),
            HttpTransport::new(),
        )
        .stages(vec![Stage::new(secs(0), 4), Stage::new(secs(3), 4)])
        .max_rps(NonZeroU32::new(10).unwrap())
        .threshold("http_req_failed", "rate<0.01")
        .await?;

        let reqs = report.snapshot.metric(HTTP_REQS).unwrap().count;
        assert!((20..=40).contains(&reqs), "issued {reqs} requests");
        assert_eq!(report.snapshot.metric(HTTP_REQ_FAILED).unwrap().rate, 0.);
        assert_eq!(report.exit_code(), ExitCode::Passed);
        Ok(())
    }
}
