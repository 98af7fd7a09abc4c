use std::net::SocketAddr;

use tracing::trace;

use crate::alerting::AlertRuleDraft;
use crate::deploy::Component;
use crate::hosts::HostRegistration;
use crate::notify::NotificationTarget;

/// Hub configuration file
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Address the HTTP API binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Bearer token required on operator endpoints; agent endpoints stay open
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub hosts: HostsConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub alerting: AlertingConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Components registered at startup
    #[serde(default)]
    pub components: Vec<Component>,

    /// Alert rules created at startup (validated like API-created rules)
    #[serde(default)]
    pub alert_rules: Vec<AlertRuleDraft>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api_token: None,
            metrics: MetricsConfig::default(),
            hosts: HostsConfig::default(),
            commands: CommandsConfig::default(),
            alerting: AlertingConfig::default(),
            notifications: NotificationsConfig::default(),
            components: Vec::new(),
            alert_rules: Vec::new(),
        }
    }
}

/// Metric retention settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MetricsConfig {
    /// Samples older than this are deleted by the housekeeping task
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u32,

    /// Ring buffer capacity per host
    #[serde(default = "default_max_samples_per_host")]
    pub max_samples_per_host: usize,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            max_samples_per_host: default_max_samples_per_host(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HostsConfig {
    /// Hosts without a heartbeat for this long are marked offline
    #[serde(default = "default_offline_after_secs")]
    pub offline_after_secs: u64,

    /// Reject heartbeats from hosts that were never registered
    #[serde(default)]
    pub strict: bool,

    #[serde(default)]
    pub registered: Vec<HostRegistration>,
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            offline_after_secs: default_offline_after_secs(),
            strict: false,
            registered: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CommandsConfig {
    /// Maximum commands piggybacked on a single heartbeat response
    #[serde(default = "default_max_per_heartbeat")]
    pub max_per_heartbeat: usize,

    /// Queue depth per host above which enqueueing logs a warning
    #[serde(default = "default_warn_queue_depth")]
    pub warn_queue_depth: usize,

    /// Issued commands without a result after this long are given up; their install
    /// deployments become FAILED
    #[serde(default = "default_result_timeout_secs")]
    pub result_timeout_secs: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            max_per_heartbeat: default_max_per_heartbeat(),
            warn_queue_depth: default_warn_queue_depth(),
            result_timeout_secs: default_result_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AlertingConfig {
    /// Resolve an open event once its metric stops breaching
    #[serde(default)]
    pub auto_resolve: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NotificationsConfig {
    /// Upper bound of concurrently running deliveries
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Deliveries waiting for a worker; overflow is recorded as failed
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    #[serde(default = "default_notification_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub targets: Vec<NotificationTarget>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_size: default_queue_size(),
            timeout_secs: default_notification_timeout_secs(),
            targets: Vec::new(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], crate::util::DEFAULT_HUB_PORT))
}

fn default_retention_hours() -> u32 {
    24
}

fn default_max_samples_per_host() -> usize {
    10_000
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_offline_after_secs() -> u64 {
    60
}

fn default_max_per_heartbeat() -> usize {
    32
}

fn default_warn_queue_depth() -> usize {
    256
}

fn default_result_timeout_secs() -> u64 {
    900
}

fn default_max_concurrent() -> usize {
    8
}

fn default_queue_size() -> usize {
    256
}

fn default_notification_timeout_secs() -> u64 {
    30
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
