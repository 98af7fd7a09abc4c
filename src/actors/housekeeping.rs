//! HousekeepingActor - Periodic metric retention and host liveness sweep
//!
//! ```text
//! Timer tick ─► delete samples older than retention ─► mark silent hosts OFFLINE
//!     │                                                  ─► fail unanswered commands
//!     ↑
//!     └─── Commands (RunNow, Shutdown)
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, instrument, warn};

use crate::deploy::DeploymentRegistry;
use crate::hosts::HostDirectory;
use crate::storage::MetricStore;

use super::messages::{HousekeepingCommand, HousekeepingReport};

#[derive(Debug, Clone)]
pub struct HousekeepingSettings {
    pub interval: Duration,
    pub retention: Duration,
    pub offline_after: Duration,
    pub result_timeout: Duration,
}

pub struct HousekeepingActor {
    settings: HousekeepingSettings,
    metrics: Arc<dyn MetricStore>,
    hosts: Arc<HostDirectory>,
    registry: Arc<DeploymentRegistry>,
    command_rx: mpsc::Receiver<HousekeepingCommand>,
}

impl HousekeepingActor {
    pub fn new(
        settings: HousekeepingSettings,
        metrics: Arc<dyn MetricStore>,
        hosts: Arc<HostDirectory>,
        registry: Arc<DeploymentRegistry>,
        command_rx: mpsc::Receiver<HousekeepingCommand>,
    ) -> Self {
        Self {
            settings,
            metrics,
            hosts,
            registry,
            command_rx,
        }
    }

    async fn sweep(&self) -> HousekeepingReport {
        let now = Utc::now();
        let mut report = HousekeepingReport::default();

        match cutoff(now, self.settings.retention) {
            Some(before) => match self.metrics.cleanup_before(before).await {
                Ok(removed) => report.samples_removed = removed,
                Err(e) => error!("metric retention cleanup failed: {e}"),
            },
            None => warn!("retention period {:?} out of range", self.settings.retention),
        }

        match cutoff(now, self.settings.offline_after) {
            Some(silent_since) => {
                report.hosts_offline = self.hosts.mark_stale(silent_since).await;
            }
            None => warn!("offline threshold {:?} out of range", self.settings.offline_after),
        }

        match cutoff(now, self.settings.result_timeout) {
            Some(issued_before) => {
                report.commands_expired = self.registry.expire_unanswered(issued_before).await;
            }
            None => warn!("result timeout {:?} out of range", self.settings.result_timeout),
        }

        report
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting housekeeping actor");

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately; nothing is stale at startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    debug!("housekeeping sweep: {report:?}");
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        HousekeepingCommand::RunNow { respond_to } => {
                            let _ = respond_to.send(self.sweep().await);
                        }

                        HousekeepingCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("housekeeping actor stopped");
    }
}

/// `now - age`, or `None` when the age does not fit chrono's range.
fn cutoff(now: DateTime<Utc>, age: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
}

#[derive(Debug, Clone)]
pub struct HousekeepingHandle {
    sender: mpsc::Sender<HousekeepingCommand>,
}

impl HousekeepingHandle {
    pub fn spawn(
        settings: HousekeepingSettings,
        metrics: Arc<dyn MetricStore>,
        hosts: Arc<HostDirectory>,
        registry: Arc<DeploymentRegistry>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let actor = HousekeepingActor::new(settings, metrics, hosts, registry, cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a sweep now and return what it did
    pub async fn run_now(&self) -> Option<HousekeepingReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HousekeepingCommand::RunNow { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(HousekeepingCommand::Shutdown).await;
    }
}
