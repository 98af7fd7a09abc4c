pub mod actors;
pub mod agent;
pub mod alerting;
pub mod api;
pub mod command;
pub mod config;
pub mod control_plane;
pub mod deploy;
pub mod error;
pub mod hosts;
pub mod intake;
pub mod notify;
pub mod storage;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use error::{FleetError, FleetResult};

pub type HostId = u64;
pub type ComponentId = u64;
pub type ServiceId = u64;
pub type ClusterId = u64;

/// Names of the three basic metrics every heartbeat carries.
pub const CPU_USAGE: &str = "cpu_usage";
pub const MEMORY_USAGE: &str = "memory_usage";
pub const DISK_USAGE: &str = "disk_usage";

/// Periodic report sent by an agent to the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub host_id: HostId,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub agent_version: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricSample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentReport>,
}

impl HeartbeatRequest {
    /// Basic metrics followed by the custom samples, in arrival order.
    pub fn samples(&self) -> Vec<MetricSample> {
        let basic = [
            (CPU_USAGE, self.cpu_usage),
            (MEMORY_USAGE, self.memory_usage),
            (DISK_USAGE, self.disk_usage),
        ];

        basic
            .into_iter()
            .map(|(name, value)| MetricSample::new(name, value, self.timestamp))
            .chain(self.metrics.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<ServiceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl MetricSample {
    pub fn new(name: impl ToString, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            value,
            timestamp,
            service_id: None,
            service_name: None,
        }
    }
}

/// Observed state of a component process on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentRuntimeStatus {
    Stopped,
    Running,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentReport {
    pub component_id: ComponentId,
    pub status: ComponentRuntimeStatus,
    #[serde(default)]
    pub process_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub commands: Vec<AgentCommand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    Install,
    Start,
    Stop,
    Configure,
}

impl CommandKind {
    /// Prefix used when building command identifiers.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            CommandKind::Install => "deploy",
            CommandKind::Start => "start",
            CommandKind::Stop => "stop",
            CommandKind::Configure => "config",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommandKind::Install => "INSTALL",
            CommandKind::Start => "START",
            CommandKind::Stop => "STOP",
            CommandKind::Configure => "CONFIGURE",
        };
        f.write_str(name)
    }
}

/// Instruction addressed to the agent of exactly one host.
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCommand {
    pub command_id: String,
    pub host_id: HostId,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl AgentCommand {
    pub fn component_id(&self) -> Option<ComponentId> {
        self.payload.get("component_id").and_then(Value::as_u64)
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCommandResponse {
    pub command_id: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl AgentCommandResponse {
    pub fn ok(command_id: impl ToString, message: impl ToString, result: Option<Value>) -> Self {
        Self {
            command_id: command_id.to_string(),
            success: true,
            message: message.to_string(),
            result,
        }
    }

    pub fn failed(command_id: impl ToString, message: impl ToString) -> Self {
        Self {
            command_id: command_id.to_string(),
            success: false,
            message: message.to_string(),
            result: None,
        }
    }
}
