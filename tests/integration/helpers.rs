//! Helper functions for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fleetwarden::{
    ComponentId, FleetError, FleetResult, HeartbeatRequest, HostId,
    agent::{ComponentRuntime, MetricSampler, ProcessProbe, SystemSample},
    alerting::AlertRuleDraft,
    config::{Config, parse_config},
    deploy::Component,
};
use serde_json::{Map, Value, json};

pub fn create_test_component(id: ComponentId) -> Component {
    Component {
        id,
        name: format!("component-{id}"),
        version: "1.0.0".to_string(),
        description: String::new(),
        package_url: format!("https://packages.test/component-{id}.tgz"),
        install_path: format!("/opt/component-{id}"),
    }
}

pub fn create_test_rule(metric: &str, operator: &str, threshold: f64) -> AlertRuleDraft {
    serde_json::from_value(json!({
        "name": format!("{metric} {operator} {threshold}"),
        "metric_name": metric,
        "operator": operator,
        "threshold": threshold,
    }))
    .unwrap()
}

pub fn create_test_config(extra: Value) -> Config {
    parse_config(&extra.to_string()).unwrap()
}

pub fn create_heartbeat(host_id: HostId, cpu_usage: f64, memory_usage: f64) -> HeartbeatRequest {
    HeartbeatRequest {
        host_id,
        hostname: Some(format!("node-{host_id}")),
        agent_version: Some("test".to_string()),
        timestamp: Utc::now(),
        cpu_usage,
        memory_usage,
        disk_usage: 10.0,
        metrics: vec![],
        components: vec![],
    }
}

/// Poll `check` until it returns true or the timeout elapses
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Sampler reporting constant values
pub struct FixedSampler {
    pub cpu_usage: f64,
}

impl MetricSampler for FixedSampler {
    fn sample(&mut self) -> SystemSample {
        SystemSample {
            cpu_usage: self.cpu_usage,
            memory_usage: 20.0,
            disk_usage: 30.0,
            metrics: vec![],
        }
    }
}

/// Runtime that records calls instead of touching the machine
#[derive(Default)]
pub struct FakeRuntime {
    pub installs: Mutex<Vec<(ComponentId, PathBuf, String)>>,
    pub configs: Mutex<Vec<(PathBuf, Map<String, Value>)>>,
    pub running: Mutex<HashMap<ComponentId, u32>>,
    pub fail_installs_with: Option<String>,
    pub hang_installs: bool,
}

impl FakeRuntime {
    pub fn failing(message: &str) -> Self {
        Self {
            fail_installs_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Installs never finish
    pub fn hanging() -> Self {
        Self {
            hang_installs: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ComponentRuntime for FakeRuntime {
    async fn install(
        &self,
        component_id: ComponentId,
        install_dir: &Path,
        package_url: &str,
    ) -> FleetResult<PathBuf> {
        if let Some(message) = &self.fail_installs_with {
            return Err(FleetError::ExecutionFailure(message.clone()));
        }
        if self.hang_installs {
            std::future::pending::<()>().await;
        }

        self.installs.lock().unwrap().push((
            component_id,
            install_dir.to_path_buf(),
            package_url.to_string(),
        ));
        Ok(install_dir.to_path_buf())
    }

    async fn start(
        &self,
        component_id: ComponentId,
        _install_dir: &Path,
        _command: Option<&str>,
    ) -> FleetResult<u32> {
        let pid = 10_000 + component_id as u32;
        self.running.lock().unwrap().insert(component_id, pid);
        Ok(pid)
    }

    async fn stop(&self, component_id: ComponentId) -> FleetResult<bool> {
        Ok(self.running.lock().unwrap().remove(&component_id).is_some())
    }

    async fn configure(&self, install_dir: &Path, config: &Map<String, Value>) -> FleetResult<PathBuf> {
        self.configs
            .lock()
            .unwrap()
            .push((install_dir.to_path_buf(), config.clone()));
        Ok(install_dir.join("config.json"))
    }

    fn probe(&self, component_id: ComponentId) -> ProcessProbe {
        match self.running.lock().unwrap().get(&component_id) {
            Some(pid) => ProcessProbe::Running(*pid),
            None => ProcessProbe::NotTracked,
        }
    }
}
