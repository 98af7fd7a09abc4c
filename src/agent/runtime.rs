//! Local process runtime used by the command executor
//!
//! The [`ComponentRuntime`] trait is the seam between command handling and the operating system,
//! so the executor can be driven by a fake in tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::{ComponentId, FleetError, FleetResult};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_START_SCRIPT: &str = "start.sh";
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Liveness of a component process as seen by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessProbe {
    Running(u32),
    Exited,
    NotTracked,
    Unknown,
}

#[async_trait]
pub trait ComponentRuntime: Send + Sync {
    /// Create `install_dir` and place the package in it. Returns the directory.
    async fn install(
        &self,
        component_id: ComponentId,
        install_dir: &Path,
        package_url: &str,
    ) -> FleetResult<PathBuf>;

    /// Spawn the component process and return its pid.
    async fn start(
        &self,
        component_id: ComponentId,
        install_dir: &Path,
        command: Option<&str>,
    ) -> FleetResult<u32>;

    /// Kill the component process. `Ok(false)` if nothing was running.
    async fn stop(&self, component_id: ComponentId) -> FleetResult<bool>;

    /// Write the configuration map into the install directory.
    async fn configure(&self, install_dir: &Path, config: &Map<String, Value>) -> FleetResult<PathBuf>;

    fn probe(&self, component_id: ComponentId) -> ProcessProbe;
}

/// Runs components as child processes of the agent
pub struct LocalRuntime {
    client: Client,
    children: Mutex<HashMap<ComponentId, Child>>,
}

impl LocalRuntime {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Package downloads give up after `timeout`.
    pub fn with_download_timeout(timeout: Duration) -> FleetResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client))
    }

    fn children(&self) -> FleetResult<std::sync::MutexGuard<'_, HashMap<ComponentId, Child>>> {
        self.children
            .lock()
            .map_err(|_| FleetError::ExecutionFailure("process table lock poisoned".into()))
    }

    async fn download(&self, url: &str, target: &Path) -> FleetResult<()> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FleetError::TransportFailure(format!(
                "package download from {url} failed with {status}"
            )));
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(target, &bytes).await?;
        debug!("downloaded {} bytes to {}", bytes.len(), target.display());
        Ok(())
    }
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::with_download_timeout(DEFAULT_DOWNLOAD_TIMEOUT).unwrap_or_else(|e| {
            warn!("download client without timeout: {e}");
            Self::new(Client::default())
        })
    }
}

/// File name of the package inside the install directory
fn package_file_name(package_url: &str) -> String {
    package_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("package")
        .to_string()
}

#[async_trait]
impl ComponentRuntime for LocalRuntime {
    async fn install(
        &self,
        component_id: ComponentId,
        install_dir: &Path,
        package_url: &str,
    ) -> FleetResult<PathBuf> {
        tokio::fs::create_dir_all(install_dir).await?;

        if package_url.is_empty() {
            info!("component {component_id}: no package, created {}", install_dir.display());
            return Ok(install_dir.to_path_buf());
        }

        let target = install_dir.join(package_file_name(package_url));
        if package_url.starts_with("http://") || package_url.starts_with("https://") {
            self.download(package_url, &target).await?;
        } else {
            let source = package_url.strip_prefix("file://").unwrap_or(package_url);
            tokio::fs::copy(source, &target).await.map_err(|e| {
                FleetError::ExecutionFailure(format!("failed to copy package {source}: {e}"))
            })?;
        }

        info!("component {component_id}: installed into {}", install_dir.display());
        Ok(install_dir.to_path_buf())
    }

    async fn start(
        &self,
        component_id: ComponentId,
        install_dir: &Path,
        command: Option<&str>,
    ) -> FleetResult<u32> {
        let default_command = install_dir.join(DEFAULT_START_SCRIPT).display().to_string();
        let command_line = command.unwrap_or(&default_command);

        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| FleetError::InvalidInput("start command is empty".into()))?;

        let mut process = Command::new(program);
        process.args(parts).kill_on_drop(false);
        if install_dir.is_dir() {
            process.current_dir(install_dir);
        }

        let child = process.spawn().map_err(|e| {
            FleetError::ExecutionFailure(format!("failed to spawn '{command_line}': {e}"))
        })?;
        let pid = child
            .id()
            .ok_or_else(|| FleetError::ExecutionFailure("process exited before reporting a pid".into()))?;

        self.children()?.insert(component_id, child);
        info!("component {component_id}: started pid {pid}");
        Ok(pid)
    }

    async fn stop(&self, component_id: ComponentId) -> FleetResult<bool> {
        let child = self.children()?.remove(&component_id);
        let Some(mut child) = child else {
            return Ok(false);
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!("component {component_id}: already exited with {status}");
            return Ok(false);
        }

        child.kill().await?;
        info!("component {component_id}: stopped");
        Ok(true)
    }

    async fn configure(&self, install_dir: &Path, config: &Map<String, Value>) -> FleetResult<PathBuf> {
        tokio::fs::create_dir_all(install_dir).await?;

        let path = install_dir.join(CONFIG_FILE_NAME);
        let contents = serde_json::to_vec_pretty(config)
            .map_err(|e| FleetError::InvalidInput(format!("unserialisable config: {e}")))?;
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    fn probe(&self, component_id: ComponentId) -> ProcessProbe {
        let Ok(mut children) = self.children() else {
            return ProcessProbe::Unknown;
        };
        let Some(child) = children.get_mut(&component_id) else {
            return ProcessProbe::NotTracked;
        };

        match child.try_wait() {
            Ok(None) => child.id().map_or(ProcessProbe::Unknown, ProcessProbe::Running),
            Ok(Some(status)) => {
                debug!("component {component_id}: process exited with {status}");
                children.remove(&component_id);
                ProcessProbe::Exited
            }
            Err(e) => {
                warn!("component {component_id}: failed to probe process: {e}");
                ProcessProbe::Unknown
            }
        }
    }
}
