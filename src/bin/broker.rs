use clap::Parser;
use telepoint::builder::direct_broker;
use telepoint::config::{BrokerConfig, read_config_file};
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
        ("broker", LevelFilter::TRACE),
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

    let config: BrokerConfig = read_config_file(&args.file)?;

    let broker = direct_broker(&config).await?;
    info!(
        "relaying {} upstream testpoints on {}",
        config.testpoints.len(),
        broker.publish_endpoint()
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    broker.shutdown().await?;

    Ok(())
}
