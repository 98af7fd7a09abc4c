use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ComponentId, ComponentRuntimeStatus, FleetError, FleetResult, HostId};

/// A deployable software unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub package_url: String,
    #[serde(default)]
    pub install_path: String,
}

impl Component {
    /// Presence checks applied before registration.
    pub fn validate(&self) -> FleetResult<()> {
        if self.id == 0 {
            return Err(FleetError::InvalidInput("component id must be non-zero".into()));
        }
        if self.name.trim().is_empty() {
            return Err(FleetError::InvalidInput("component name must not be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(FleetError::InvalidInput("component version must not be empty".into()));
        }
        if self.package_url.trim().is_empty() {
            return Err(FleetError::InvalidInput("component package url must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Pending,
    Installing,
    Installed,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Installed | DeploymentStatus::Failed)
    }

    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;

        matches!(
            (self, next),
            (Pending, Installing) | (Pending, Failed) | (Installing, Installed) | (Installing, Failed)
        )
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeploymentStatus::Pending => "PENDING",
            DeploymentStatus::Installing => "INSTALLING",
            DeploymentStatus::Installed => "INSTALLED",
            DeploymentStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One (host, component) installation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub host_id: HostId,
    pub component_id: ComponentId,
    pub status: DeploymentStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Deployment {
    pub fn new(
        id: String,
        host_id: HostId,
        component_id: ComponentId,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            host_id,
            component_id,
            status: DeploymentStatus::Pending,
            start_time,
            end_time: None,
            error_message: None,
        }
    }

    /// Apply a forward transition, stamping `end_time` on terminal states.
    pub fn transition(
        &mut self,
        next: DeploymentStatus,
        at: DateTime<Utc>,
        error_message: Option<String>,
    ) -> FleetResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(FleetError::InvalidState(format!(
                "deployment {} cannot move from {} to {next}",
                self.id, self.status
            )));
        }

        self.status = next;
        if next.is_terminal() {
            self.end_time = Some(at);
        }
        if next == DeploymentStatus::Failed {
            self.error_message = error_message;
        }

        Ok(())
    }
}

/// Last agent-reported runtime state of a component on a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    pub component_id: ComponentId,
    pub status: ComponentRuntimeStatus,
    pub process_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}
