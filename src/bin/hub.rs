use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fleetwarden::{
    api::{ApiConfig, ApiState, spawn_api_server},
    config::read_config_file,
    control_plane::ControlPlane,
    util::get_bind_addr,
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Verbosity of the hub's own log output
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleetwarden", level),
        ("fleetwarden_hub", level),
        ("tower_http", LevelFilter::WARN),
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
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)
        .with_context(|| format!("failed to load configuration from {}", args.file))?;

    let plane = Arc::new(ControlPlane::start(&config).await?);

    let api_config = ApiConfig {
        bind_addr: get_bind_addr().unwrap_or(config.bind_addr),
        auth_token: config.api_token.clone(),
        enable_cors: true,
    };
    let addr = spawn_api_server(api_config, ApiState::new(plane.clone())).await?;
    info!("hub ready on {addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("received shutdown signal");
    plane.shutdown().await;

    Ok(())
}
