use anyhow::Context;
use clap::Parser;
use gazette::server::shutdown_signal;
use gazette::{telemetry, Cli, Server};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config().context("invalid configuration")?;
    telemetry::init(&config.logging).context("failed to initialise logging")?;

    let server = Server::build(&config).context("failed to build services")?;
    let listener = TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    info!(
        bind = %config.server.bind,
        cache = config.cache.enabled,
        max_cost = config.cost.max_cost,
        max_depth = config.cost.max_depth,
        "gazette listening"
    );
    server.serve(listener, shutdown_signal()).await?;
    Ok(())
}
