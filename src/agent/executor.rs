use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use crate::{
    AgentCommand, AgentCommandResponse, CommandKind, ComponentId, ComponentReport,
    ComponentRuntimeStatus, FleetError, FleetResult,
};

use super::runtime::{ComponentRuntime, ProcessProbe};

/// What the agent knows about a component it has handled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalComponent {
    pub install_dir: PathBuf,
    pub version: Option<String>,
    pub installed: bool,
}

/// Dispatches commands to idempotent handlers
///
/// `execute` always produces a response. Handler errors become `success = false` with the error
/// text as message.
#[derive(Clone)]
pub struct CommandExecutor {
    runtime: Arc<dyn ComponentRuntime>,
    work_dir: PathBuf,
    components: Arc<RwLock<BTreeMap<ComponentId, LocalComponent>>>,
}

impl CommandExecutor {
    pub fn new(runtime: Arc<dyn ComponentRuntime>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            work_dir: work_dir.into(),
            components: Arc::default(),
        }
    }

    #[instrument(skip(self, command), fields(command_id = %command.command_id, kind = %command.kind))]
    pub async fn execute(&self, command: &AgentCommand) -> AgentCommandResponse {
        let outcome = match command.kind {
            CommandKind::Install => self.install(command).await,
            CommandKind::Start => self.start(command).await,
            CommandKind::Stop => self.stop(command).await,
            CommandKind::Configure => self.configure(command).await,
        };

        match outcome {
            Ok((message, result)) => {
                info!("{message}");
                AgentCommandResponse::ok(&command.command_id, message, result)
            }
            Err(e) => {
                warn!("command failed: {e}");
                AgentCommandResponse::failed(&command.command_id, e)
            }
        }
    }

    /// Current runtime status of every component this agent has handled
    pub fn component_reports(&self) -> Vec<ComponentReport> {
        let ids: Vec<ComponentId> = match self.components.read() {
            Ok(components) => components.keys().copied().collect(),
            Err(_) => return vec![],
        };

        ids.into_iter()
            .map(|component_id| {
                let (status, process_id) = match self.runtime.probe(component_id) {
                    ProcessProbe::Running(pid) => (ComponentRuntimeStatus::Running, Some(pid)),
                    ProcessProbe::Exited | ProcessProbe::NotTracked => {
                        (ComponentRuntimeStatus::Stopped, None)
                    }
                    ProcessProbe::Unknown => (ComponentRuntimeStatus::Unknown, None),
                };

                ComponentReport {
                    component_id,
                    status,
                    process_id,
                    message: None,
                }
            })
            .collect()
    }

    pub fn local_component(&self, component_id: ComponentId) -> Option<LocalComponent> {
        self.components.read().ok()?.get(&component_id).cloned()
    }

    fn record(&self, component_id: ComponentId, update: impl FnOnce(&mut LocalComponent)) {
        if let Ok(mut components) = self.components.write() {
            let entry = components.entry(component_id).or_insert_with(|| LocalComponent {
                install_dir: self.default_install_dir(component_id),
                ..LocalComponent::default()
            });
            update(entry);
        }
    }

    fn default_install_dir(&self, component_id: ComponentId) -> PathBuf {
        self.work_dir.join("components").join(component_id.to_string())
    }

    /// Payload path, else the directory used before, else one below the work dir.
    fn install_dir(&self, command: &AgentCommand, component_id: ComponentId) -> PathBuf {
        if let Some(path) = command.payload_str("install_path").filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }

        self.local_component(component_id)
            .map(|local| local.install_dir)
            .unwrap_or_else(|| self.default_install_dir(component_id))
    }

    async fn install(&self, command: &AgentCommand) -> FleetResult<(String, Option<Value>)> {
        let component_id = required_component(command)?;
        let install_dir = self.install_dir(command, component_id);
        let version = command.payload_str("version").map(str::to_string);

        let already_installed = self.local_component(component_id).is_some_and(|local| {
            local.installed && local.install_dir == install_dir && local.version == version
        });
        if already_installed {
            return Ok((
                format!("component {component_id} already installed"),
                Some(json!({ "install_path": display(&install_dir) })),
            ));
        }

        let package_url = command.payload_str("package_url").unwrap_or_default();
        let installed_at = self
            .runtime
            .install(component_id, &install_dir, package_url)
            .await?;

        self.record(component_id, |local| {
            local.install_dir = installed_at.clone();
            local.version = version;
            local.installed = true;
        });

        Ok((
            format!("component {component_id} installed"),
            Some(json!({ "install_path": display(&installed_at) })),
        ))
    }

    async fn start(&self, command: &AgentCommand) -> FleetResult<(String, Option<Value>)> {
        let component_id = required_component(command)?;

        if let ProcessProbe::Running(pid) = self.runtime.probe(component_id) {
            return Ok((
                format!("component {component_id} already running"),
                Some(json!({ "pid": pid })),
            ));
        }

        let install_dir = self.install_dir(command, component_id);
        let pid = self
            .runtime
            .start(component_id, &install_dir, command.payload_str("command"))
            .await?;

        self.record(component_id, |local| local.install_dir = install_dir);

        Ok((
            format!("component {component_id} started"),
            Some(json!({ "pid": pid })),
        ))
    }

    async fn stop(&self, command: &AgentCommand) -> FleetResult<(String, Option<Value>)> {
        let component_id = required_component(command)?;

        let message = if self.runtime.stop(component_id).await? {
            format!("component {component_id} stopped")
        } else {
            format!("component {component_id} not running")
        };

        Ok((message, None))
    }

    async fn configure(&self, command: &AgentCommand) -> FleetResult<(String, Option<Value>)> {
        let component_id = required_component(command)?;
        let install_dir = self.install_dir(command, component_id);

        let config = match command.payload.get("config") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(config)) => config.clone(),
            Some(other) => {
                return Err(FleetError::InvalidInput(format!(
                    "config must be an object, got {other}"
                )));
            }
        };

        let path = self.runtime.configure(&install_dir, &config).await?;
        self.record(component_id, |local| local.install_dir = install_dir);

        Ok((
            format!("component {component_id} configured"),
            Some(json!({ "config_path": display(&path) })),
        ))
    }
}

fn required_component(command: &AgentCommand) -> FleetResult<ComponentId> {
    command
        .component_id()
        .ok_or_else(|| FleetError::InvalidInput("payload is missing component_id".into()))
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
