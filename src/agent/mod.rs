//! Agent side of the fleet protocol
//!
//! ```text
//!  interval tick ─► SystemSampler + component probes ─► POST heartbeat ─► commands
//!                                                                            │
//!            POST command-result ◄── CommandExecutor ◄── worker queue ◄──────┘
//! ```
//!
//! The heartbeat loop never runs a command itself. Commands go to a single worker task that
//! executes them one at a time in arrival order. Queueing a command never waits on the worker,
//! and every command is cut off after [`AgentConfig::command_timeout`], so a hung install
//! cannot delay the next heartbeat nor hold back later commands forever. Results the hub did
//! not accept are resent until it does.

pub mod client;
pub mod collector;
pub mod executor;
pub mod runtime;
pub mod session;

use std::path::PathBuf;
use std::time::Duration;

pub use client::HubClient;
pub use collector::{MetricSampler, SystemSample, SystemSampler};
pub use executor::CommandExecutor;
pub use runtime::{ComponentRuntime, LocalRuntime, ProcessProbe};
pub use session::AgentHandle;

use crate::HostId;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the hub, e.g. `http://hub:8080`
    pub server_url: String,
    pub host_id: HostId,
    pub hostname: Option<String>,
    pub heartbeat_interval: Duration,
    pub request_timeout: Duration,

    /// Upper bound of a single command's execution; it is reported as failed afterwards
    pub command_timeout: Duration,

    /// Default parent directory of component installs
    pub work_dir: PathBuf,
}

impl AgentConfig {
    pub fn new(server_url: impl ToString, host_id: HostId) -> Self {
        Self {
            server_url: server_url.to_string(),
            host_id,
            hostname: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            work_dir: PathBuf::from("./fleetwarden-agent"),
        }
    }

    /// Request timeout, kept strictly below the heartbeat interval.
    pub fn effective_timeout(&self) -> Duration {
        if self.request_timeout.is_zero() || self.request_timeout >= self.heartbeat_interval {
            self.heartbeat_interval / 2
        } else {
            self.request_timeout
        }
    }
}
