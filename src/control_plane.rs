//! Composition root of the hub
//!
//! Every service is constructed exactly once here and shared through `Arc`s. Nothing in the crate
//! reaches for a global instance.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::actors::housekeeping::HousekeepingSettings;
use crate::actors::{HousekeepingHandle, NotifierHandle, ResultProcessorHandle};
use crate::alerting::AlertEvaluator;
use crate::command::{CommandChannel, result_channel};
use crate::config::Config;
use crate::deploy::DeploymentRegistry;
use crate::hosts::HostDirectory;
use crate::intake::MetricIntake;
use crate::notify::{HttpSender, NotificationAudit, NotificationSender, TargetDirectory};
use crate::storage::{MemoryStore, MetricStore};

pub struct ControlPlane {
    pub registry: Arc<DeploymentRegistry>,
    pub evaluator: Arc<AlertEvaluator>,
    pub hosts: Arc<HostDirectory>,
    pub metrics: Arc<dyn MetricStore>,
    pub targets: Arc<TargetDirectory>,
    pub audit: Arc<NotificationAudit>,
    pub intake: MetricIntake,
    pub housekeeping: HousekeepingHandle,
    commands: CommandChannel,
    notifier: NotifierHandle,
    results: ResultProcessorHandle,
    started_at: DateTime<Utc>,
}

impl ControlPlane {
    /// Build all services from the configuration, seed them and spawn the actors.
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        Self::start_with_sender(config, Arc::new(HttpSender::default())).await
    }

    /// Like [`ControlPlane::start`] with a custom notification transport.
    pub async fn start_with_sender(
        config: &Config,
        sender: Arc<dyn NotificationSender>,
    ) -> anyhow::Result<Self> {
        let commands = CommandChannel::new(config.commands.warn_queue_depth);
        let (result_tx, result_rx) = result_channel();

        let registry = Arc::new(DeploymentRegistry::new(commands.sender()));
        let hosts = Arc::new(HostDirectory::new(config.hosts.strict));
        let metrics: Arc<dyn MetricStore> =
            Arc::new(MemoryStore::new(config.metrics.max_samples_per_host));
        let targets = Arc::new(TargetDirectory::new());
        let audit = Arc::new(NotificationAudit::new());

        let notifier =
            NotifierHandle::spawn(&config.notifications, targets.clone(), audit.clone(), sender);
        let evaluator = Arc::new(
            AlertEvaluator::new(config.alerting.auto_resolve)
                .with_dispatcher(Arc::new(notifier.clone())),
        );

        for component in &config.components {
            component
                .validate()
                .with_context(|| format!("invalid component {} in configuration", component.id))?;
            registry.register_component(component.clone()).await;
        }

        for draft in &config.alert_rules {
            evaluator
                .create_rule(draft.clone())
                .await
                .with_context(|| format!("invalid alert rule '{}' in configuration", draft.name))?;
        }

        for target in &config.notifications.targets {
            targets
                .upsert(target.clone())
                .await
                .with_context(|| format!("invalid notification target {} in configuration", target.id))?;
        }

        for host in &config.hosts.registered {
            hosts
                .register(host.clone())
                .await
                .with_context(|| format!("invalid host {} in configuration", host.id))?;
        }

        let results = ResultProcessorHandle::spawn(registry.clone(), result_rx);
        let housekeeping = HousekeepingHandle::spawn(
            HousekeepingSettings {
                interval: Duration::from_secs(config.metrics.cleanup_interval_secs.max(1)),
                retention: Duration::from_secs(u64::from(config.metrics.retention_hours) * 3600),
                offline_after: Duration::from_secs(config.hosts.offline_after_secs),
                result_timeout: Duration::from_secs(config.commands.result_timeout_secs),
            },
            metrics.clone(),
            hosts.clone(),
            registry.clone(),
        );

        let intake = MetricIntake::new(
            hosts.clone(),
            metrics.clone(),
            registry.clone(),
            evaluator.clone(),
            commands.clone(),
            result_tx,
            config.commands.max_per_heartbeat,
        );

        info!(
            "control plane started with {} components, {} alert rules, {} notification targets",
            config.components.len(),
            config.alert_rules.len(),
            config.notifications.targets.len()
        );

        Ok(Self {
            registry,
            evaluator,
            hosts,
            metrics,
            targets,
            audit,
            intake,
            housekeeping,
            commands,
            notifier,
            results,
            started_at: Utc::now(),
        })
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Commands queued for agents that have not been handed out yet
    pub fn pending_commands(&self) -> usize {
        self.commands.pending_total()
    }

    /// Stop accepting commands and let the actors finish their queued work.
    pub async fn shutdown(&self) {
        info!("shutting down control plane");
        self.commands.close();
        self.housekeeping.shutdown().await;
        self.results.shutdown().await;
        self.notifier.shutdown().await;
    }
}
