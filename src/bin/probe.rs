//! Probe-hosting process, spawned by a controller's probe container.
//!
//! All parameters arrive through the environment; there are no arguments.

use telepoint::probe::{BootstrapEnv, BuiltinLoader, ProbeServer, UnavailableScriptHost};
use tracing::{level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("telepoint", LevelFilter::TRACE),
        ("probe", LevelFilter::TRACE),
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

    let env = BootstrapEnv::from_env()?;
    trace!("bootstrapping probe {} on {}", env.index, env.node_id);

    let server = ProbeServer::bootstrap(
        env,
        Box::new(BuiltinLoader),
        Box::new(UnavailableScriptHost),
    )
    .await?;

    server.run().await?;

    Ok(())
}
