use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use fleetwarden::{
    agent::{AgentConfig, AgentHandle, LocalRuntime, SystemSampler},
    util::get_hostname,
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Base URL of the hub
    #[arg(long, env = "FLEET_SERVER")]
    server: String,

    /// Id of the host this agent runs on
    #[arg(long, env = "FLEET_HOST_ID")]
    host_id: u64,

    /// Hostname reported to the hub (default: system hostname)
    #[arg(long, env = "FLEET_HOSTNAME")]
    hostname: Option<String>,

    /// Seconds between heartbeats
    #[arg(long, env = "FLEET_HEARTBEAT_SECS", default_value_t = 10)]
    heartbeat_secs: u64,

    /// Timeout of a single hub request in seconds
    #[arg(long, env = "FLEET_REQUEST_TIMEOUT_SECS", default_value_t = 5)]
    request_timeout_secs: u64,

    /// Seconds a single command may run before it is reported as failed
    #[arg(long, env = "FLEET_COMMAND_TIMEOUT_SECS", default_value_t = 300)]
    command_timeout_secs: u64,

    /// Seconds a package download may take
    #[arg(long, env = "FLEET_DOWNLOAD_TIMEOUT_SECS", default_value_t = 120)]
    download_timeout_secs: u64,

    /// Parent directory of component installs
    #[arg(long, env = "FLEET_WORK_DIR", default_value = "./fleetwarden-agent")]
    work_dir: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new()
        .with_targets(vec![("fleetwarden", level), ("fleetwarden_agent", level)]);
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
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let mut config = AgentConfig::new(&args.server, args.host_id);
    config.hostname = Some(args.hostname.unwrap_or_else(get_hostname));
    config.heartbeat_interval = Duration::from_secs(args.heartbeat_secs.max(1));
    config.request_timeout = Duration::from_secs(args.request_timeout_secs);
    config.command_timeout = Duration::from_secs(args.command_timeout_secs.max(1));
    config.work_dir = args.work_dir;

    let runtime = LocalRuntime::with_download_timeout(Duration::from_secs(
        args.download_timeout_secs.max(1),
    ))
    .context("failed to build package download client")?;

    let agent = AgentHandle::spawn(config, Box::new(SystemSampler::new()), Arc::new(runtime))
        .context("failed to start agent")?;
    info!("agent for host {} started", args.host_id);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("received shutdown signal");
    agent.shutdown().await;

    Ok(())
}
