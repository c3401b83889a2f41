use clap::Parser;
use telepoint::builder::direct_recorder;
use telepoint::config::{RecorderConfig, read_config_file};
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
        ("recorder", LevelFilter::TRACE),
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

    let config: RecorderConfig = read_config_file(&args.file)?;

    let recorder = direct_recorder(&config).await?;
    info!(
        "recording {} testpoints to {}",
        config.testpoints.len(),
        config.output.display()
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    recorder.shutdown().await?;

    Ok(())
}
