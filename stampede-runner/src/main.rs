use clap::Parser;
use stampede_runner::{Cli, StampedeRunner};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(&cli.log_filter))
        .with_writer(std::io::stderr)
        .init();

    let code = StampedeRunner::from_cli(&cli).run().await;
    std::process::exit(code.code());
}
