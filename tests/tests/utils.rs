use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

pub const MOCK_ADDR: &str = "127.0.0.1:3002";

#[allow(unused)]
pub fn url(path: &str) -> String {
    format!("http://{MOCK_ADDR}{path}")
}

#[allow(unused)]
pub async fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    let wait = ONCE_LOCK.get().is_none();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
            std::process::exit(1);
        }));

        FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter("stampede=debug,mock_service=info")
            .init();

        // The mock service and the exporter get their own thread so they outlive the runtime of
        // whichever test happened to start them.
        std::thread::spawn(|| {
            PrometheusBuilder::new()
                .with_http_listener("0.0.0.0:8002".parse::<SocketAddr>().unwrap())
                .install()
                .unwrap();

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let addr: SocketAddr = MOCK_ADDR.parse().unwrap();
                if let Err(err) = mock_service::run(addr).await {
                    error!("Mock service failed: {err}");
                }
            });
        });
    });

    if wait {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
