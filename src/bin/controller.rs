use clap::Parser;
use telepoint::builder::direct_controller;
use telepoint::config::{ControllerConfig, read_config_file};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("telepoint", LevelFilter::TRACE),
        ("controller", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config: ControllerConfig = read_config_file(&args.file)?;

    let mut controller = direct_controller(&config).await?;

    controller.initialize().await?;
    controller.start_probes().await;

    info!(
        "node {} sampling with {} probes ({} failed)",
        controller.node_id(),
        controller.probe_count(),
        controller.failed_count()
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    controller.stop_probes().await;
    controller.shutdown().await?;

    Ok(())
}
