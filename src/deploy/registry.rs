use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, trace, warn};

use crate::command::{CommandIdGenerator, CommandSender};
use crate::{
    AgentCommand, AgentCommandResponse, CommandKind, ComponentId, ComponentReport, FleetError,
    FleetResult, HostId,
};

use super::model::{Component, ComponentState, Deployment, DeploymentStatus};

/// Command issued by the registry whose result has not arrived yet
#[derive(Debug, Clone)]
struct IssuedCommand {
    host_id: HostId,
    component_id: ComponentId,
    kind: CommandKind,
    issued_at: DateTime<Utc>,
}

/// Everything guarded by the deployment lock
#[derive(Debug, Default)]
struct DeploymentBook {
    /// Append-only install history per host
    by_host: HashMap<HostId, Vec<Deployment>>,

    /// Correlation of command ids to what they were issued for
    in_flight: HashMap<String, IssuedCommand>,

    /// Last reported runtime state, keyed by host then component
    runtime: HashMap<HostId, BTreeMap<ComponentId, ComponentState>>,
}

impl DeploymentBook {
    fn active_deployment(&self, host_id: HostId, component_id: ComponentId) -> Option<&Deployment> {
        self.by_host.get(&host_id)?.iter().find(|deployment| {
            deployment.component_id == component_id && !deployment.status.is_terminal()
        })
    }

    fn deployment_mut(&mut self, host_id: HostId, deployment_id: &str) -> Option<&mut Deployment> {
        self.by_host
            .get_mut(&host_id)?
            .iter_mut()
            .find(|deployment| deployment.id == deployment_id)
    }
}

/// What applying a command result changed
#[derive(Debug, Clone, PartialEq)]
pub enum ResultDisposition {
    /// An install result moved a deployment to a terminal state
    DeploymentSettled {
        deployment_id: String,
        status: DeploymentStatus,
    },

    /// A start/stop/configure result was acknowledged
    CommandCompleted {
        command_id: String,
        kind: CommandKind,
        success: bool,
    },

    /// The result did not correlate with any issued command
    Discarded,
}

/// Component catalogue and per-host deployment bookkeeping
///
/// Component registration and deployment bookkeeping use separate locks, so one never
/// waits on the other. Neither lock is held across a command send.
#[derive(Debug)]
pub struct DeploymentRegistry {
    components: RwLock<HashMap<ComponentId, Component>>,
    book: RwLock<DeploymentBook>,
    commands: CommandSender,
    ids: CommandIdGenerator,
}

impl DeploymentRegistry {
    pub fn new(commands: CommandSender) -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
            book: RwLock::new(DeploymentBook::default()),
            commands,
            ids: CommandIdGenerator::new(),
        }
    }

    /// Insert or replace a component definition. Returns the previous definition, if any.
    pub async fn register_component(&self, component: Component) -> Option<Component> {
        let id = component.id;
        let previous = self.components.write().await.insert(id, component);

        match &previous {
            Some(_) => debug!("re-registered component {id}"),
            None => info!("registered component {id}"),
        }

        previous
    }

    pub async fn get_component(&self, component_id: ComponentId) -> FleetResult<Component> {
        self.components
            .read()
            .await
            .get(&component_id)
            .cloned()
            .ok_or_else(|| FleetError::not_found("component", component_id))
    }

    /// All registered components ordered by id
    pub async fn list_components(&self) -> Vec<Component> {
        let mut components: Vec<_> = self.components.read().await.values().cloned().collect();
        components.sort_by_key(|component| component.id);
        components
    }

    /// Accept an install request and enqueue the `INSTALL` command.
    ///
    /// Returns the deployment id as soon as the command is queued; the outcome arrives later
    /// through [`DeploymentRegistry::process_command_result`].
    #[instrument(skip(self))]
    pub async fn deploy(&self, host_id: HostId, component_id: ComponentId) -> FleetResult<String> {
        let component = self.get_component(component_id).await?;
        let deployment_id = self.ids.next(CommandKind::Install, host_id, component_id);

        {
            let mut book = self.book.write().await;

            if let Some(active) = book.active_deployment(host_id, component_id) {
                return Err(FleetError::InvalidState(format!(
                    "component {component_id} on host {host_id} already has deployment {} in {}",
                    active.id, active.status
                )));
            }

            book.by_host.entry(host_id).or_default().push(Deployment::new(
                deployment_id.clone(),
                host_id,
                component_id,
                Utc::now(),
            ));
            book.in_flight.insert(
                deployment_id.clone(),
                IssuedCommand {
                    host_id,
                    component_id,
                    kind: CommandKind::Install,
                    issued_at: Utc::now(),
                },
            );
        }

        let command = AgentCommand {
            command_id: deployment_id.clone(),
            host_id,
            kind: CommandKind::Install,
            payload: install_payload(&component),
        };

        match self.commands.send(command) {
            Ok(()) => {
                self.advance(host_id, &deployment_id, DeploymentStatus::Installing, None)
                    .await;
                info!("deployment {deployment_id} queued");
                Ok(deployment_id)
            }
            Err(e) => {
                warn!("failed to queue deployment {deployment_id}: {e}");
                let mut book = self.book.write().await;
                book.in_flight.remove(&deployment_id);
                if let Some(deployment) = book.deployment_mut(host_id, &deployment_id) {
                    if let Err(e) = deployment.transition(
                        DeploymentStatus::Failed,
                        Utc::now(),
                        Some(e.to_string()),
                    ) {
                        trace!("deployment {deployment_id} left as is: {e}");
                    }
                }
                Err(e)
            }
        }
    }

    pub async fn start_component(
        &self,
        host_id: HostId,
        component_id: ComponentId,
    ) -> FleetResult<String> {
        self.issue(CommandKind::Start, host_id, component_id, Map::new())
            .await
    }

    pub async fn stop_component(
        &self,
        host_id: HostId,
        component_id: ComponentId,
    ) -> FleetResult<String> {
        self.issue(CommandKind::Stop, host_id, component_id, Map::new())
            .await
    }

    pub async fn configure_component(
        &self,
        host_id: HostId,
        component_id: ComponentId,
        config: Map<String, Value>,
    ) -> FleetResult<String> {
        let mut extra = Map::new();
        extra.insert("config".into(), Value::Object(config));
        self.issue(CommandKind::Configure, host_id, component_id, extra)
            .await
    }

    /// Start/stop/configure are decoupled from deployment history: no record is needed.
    #[instrument(skip(self, extra))]
    async fn issue(
        &self,
        kind: CommandKind,
        host_id: HostId,
        component_id: ComponentId,
        extra: Map<String, Value>,
    ) -> FleetResult<String> {
        let mut payload = Map::new();
        payload.insert("component_id".into(), json!(component_id));

        if let Some(component) = self.components.read().await.get(&component_id) {
            if !component.install_path.is_empty() {
                payload.insert("install_path".into(), json!(component.install_path));
            }
        }
        payload.extend(extra);

        let command_id = self.ids.next(kind, host_id, component_id);
        self.book.write().await.in_flight.insert(
            command_id.clone(),
            IssuedCommand {
                host_id,
                component_id,
                kind,
                issued_at: Utc::now(),
            },
        );

        let command = AgentCommand {
            command_id: command_id.clone(),
            host_id,
            kind,
            payload,
        };

        if let Err(e) = self.commands.send(command) {
            self.book.write().await.in_flight.remove(&command_id);
            return Err(e);
        }

        debug!("queued {kind} command {command_id}");
        Ok(command_id)
    }

    /// Apply an agent-reported command result.
    ///
    /// Results for unknown (or already settled) command ids are logged and discarded.
    #[instrument(skip(self, response), fields(command_id = %response.command_id))]
    pub async fn process_command_result(
        &self,
        response: &AgentCommandResponse,
    ) -> ResultDisposition {
        let mut book = self.book.write().await;

        let Some(issued) = book.in_flight.remove(&response.command_id) else {
            warn!("discarding result for unknown command");
            return ResultDisposition::Discarded;
        };

        if issued.kind != CommandKind::Install {
            if response.success {
                debug!(
                    "{} of component {} on host {} succeeded",
                    issued.kind, issued.component_id, issued.host_id
                );
            } else {
                warn!(
                    "{} of component {} on host {} failed: {}",
                    issued.kind, issued.component_id, issued.host_id, response.message
                );
            }

            return ResultDisposition::CommandCompleted {
                command_id: response.command_id.clone(),
                kind: issued.kind,
                success: response.success,
            };
        }

        let Some(deployment) = book.deployment_mut(issued.host_id, &response.command_id) else {
            warn!("install result has no deployment record");
            return ResultDisposition::Discarded;
        };

        let now = Utc::now();

        // The agent may answer before the enqueue path recorded INSTALLING.
        if deployment.status == DeploymentStatus::Pending {
            if let Err(e) = deployment.transition(DeploymentStatus::Installing, now, None) {
                trace!("deployment {} not moved to INSTALLING: {e}", deployment.id);
            }
        }

        let (next, error) = if response.success {
            (DeploymentStatus::Installed, None)
        } else {
            (DeploymentStatus::Failed, Some(response.message.clone()))
        };

        if let Err(e) = deployment.transition(next, now, error) {
            warn!("ignoring install result: {e}");
            return ResultDisposition::Discarded;
        }

        info!("deployment {} is {next}", deployment.id);
        ResultDisposition::DeploymentSettled {
            deployment_id: deployment.id.clone(),
            status: next,
        }
    }

    /// Give up on commands issued at or before `cutoff` that never got a result.
    ///
    /// Their install deployments become FAILED, so the component can be deployed again. A
    /// result arriving afterwards is discarded. Returns the expired command ids.
    #[instrument(skip(self))]
    pub async fn expire_unanswered(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut book = self.book.write().await;

        let mut expired: Vec<String> = book
            .in_flight
            .iter()
            .filter(|(_, issued)| issued.issued_at <= cutoff)
            .map(|(command_id, _)| command_id.clone())
            .collect();
        expired.sort();

        let now = Utc::now();
        for command_id in &expired {
            let Some(issued) = book.in_flight.remove(command_id) else {
                continue;
            };

            if issued.kind != CommandKind::Install {
                debug!("{} command {command_id} expired without a result", issued.kind);
                continue;
            }

            let Some(deployment) = book.deployment_mut(issued.host_id, command_id) else {
                continue;
            };
            let reason = format!(
                "no result from host {} since {}",
                issued.host_id, issued.issued_at
            );
            match deployment.transition(DeploymentStatus::Failed, now, Some(reason)) {
                Ok(()) => warn!("deployment {command_id} failed: no result from the agent"),
                Err(e) => trace!("deployment {command_id} not expired: {e}"),
            }
        }

        expired
    }

    /// Install history of a host, oldest first.
    pub async fn get_deployments(&self, host_id: HostId) -> Vec<Deployment> {
        self.book
            .read()
            .await
            .by_host
            .get(&host_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn get_deployment(&self, deployment_id: &str) -> FleetResult<Deployment> {
        self.book
            .read()
            .await
            .by_host
            .values()
            .flatten()
            .find(|deployment| deployment.id == deployment_id)
            .cloned()
            .ok_or_else(|| FleetError::not_found("deployment", deployment_id))
    }

    /// Number of issued commands still waiting for a result
    pub async fn in_flight_commands(&self) -> usize {
        self.book.read().await.in_flight.len()
    }

    /// Record the component states an agent reported with its heartbeat.
    pub async fn update_component_status(
        &self,
        host_id: HostId,
        reports: &[ComponentReport],
        reported_at: DateTime<Utc>,
    ) {
        if reports.is_empty() {
            return;
        }

        let mut book = self.book.write().await;
        let states = book.runtime.entry(host_id).or_default();

        for report in reports {
            trace!(
                "host {host_id} component {} is {:?}",
                report.component_id, report.status
            );
            states.insert(
                report.component_id,
                ComponentState {
                    component_id: report.component_id,
                    status: report.status,
                    process_id: report.process_id,
                    message: report.message.clone(),
                    updated_at: reported_at,
                },
            );
        }
    }

    /// Last reported state of every component on a host, ordered by component id.
    pub async fn component_statuses(&self, host_id: HostId) -> Vec<ComponentState> {
        self.book
            .read()
            .await
            .runtime
            .get(&host_id)
            .map(|states| states.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn advance(
        &self,
        host_id: HostId,
        deployment_id: &str,
        next: DeploymentStatus,
        error: Option<String>,
    ) {
        let mut book = self.book.write().await;
        let Some(deployment) = book.deployment_mut(host_id, deployment_id) else {
            return;
        };

        if let Err(e) = deployment.transition(next, Utc::now(), error) {
            // A fast agent result may already have settled the deployment.
            trace!("not advancing deployment: {e}");
        }
    }
}

fn install_payload(component: &Component) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("component_id".into(), json!(component.id));
    payload.insert("name".into(), json!(component.name));
    payload.insert("version".into(), json!(component.version));
    payload.insert("package_url".into(), json!(component.package_url));
    if !component.install_path.is_empty() {
        payload.insert("install_path".into(), json!(component.install_path));
    }
    payload
}
