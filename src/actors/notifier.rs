//! NotifierActor - Delivers alert events to notification targets
//!
//! Deliveries enter through a bounded queue. The actor starts each one on its own task once a
//! semaphore permit is available, so at most `max_concurrent` sends run at a time. When the
//! queue is full the delivery is dropped and recorded as failed in the audit history.
//!
//! ```text
//! evaluator ──try_send──► [bounded queue] ──permit──► spawn(send with timeout) ──► audit
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, instrument, trace, warn};

use crate::alerting::AlertEvent;
use crate::config::NotificationsConfig;
use crate::notify::{AlertDispatch, NotificationAudit, NotificationSender, TargetDirectory, TargetId};

use super::messages::{Delivery, NotifierCommand};

/// Shared pieces every delivery task needs
#[derive(Clone)]
struct DeliveryContext {
    targets: Arc<TargetDirectory>,
    audit: Arc<NotificationAudit>,
    sender: Arc<dyn NotificationSender>,
    timeout: Duration,
}

impl DeliveryContext {
    #[instrument(skip(self, delivery), fields(target_id = delivery.target_id, event_id = delivery.event.id))]
    async fn deliver(self, delivery: Delivery) {
        let Delivery { target_id, event } = delivery;

        let target = match self.targets.get(target_id).await {
            Ok(target) => target,
            Err(e) => {
                self.audit.record_failure(event.id, target_id, "unknown", None, e);
                return;
            }
        };

        if !target.enabled {
            debug!("target {target_id} is disabled, skipping");
            return;
        }

        let channel = target.channel.kind();
        let recipient = Some(target.channel.url().to_string());

        match timeout(self.timeout, self.sender.send(&target, &event)).await {
            Ok(Ok(())) => self
                .audit
                .record_success(event.id, target_id, channel, recipient),
            Ok(Err(e)) => self
                .audit
                .record_failure(event.id, target_id, channel, recipient, e),
            Err(_) => self.audit.record_failure(
                event.id,
                target_id,
                channel,
                recipient,
                format!("timed out after {}s", self.timeout.as_secs_f64()),
            ),
        }
    }
}

/// Actor running the bounded notification worker pool
pub struct NotifierActor {
    context: DeliveryContext,
    delivery_rx: mpsc::Receiver<Delivery>,
    command_rx: mpsc::Receiver<NotifierCommand>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl NotifierActor {
    async fn start_delivery(&mut self, delivery: Delivery) {
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            warn!("notification semaphore closed, dropping delivery");
            return;
        };

        let context = self.context.clone();
        self.tasks.spawn(async move {
            context.deliver(delivery).await;
            drop(permit);
        });

        // Reap finished tasks so the set does not grow without bound.
        while self.tasks.try_join_next().is_some() {}
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting notifier actor");

        let shutdown_reply = loop {
            tokio::select! {
                Some(delivery) = self.delivery_rx.recv() => {
                    trace!("delivering alert event {} to target {}", delivery.event.id, delivery.target_id);
                    self.start_delivery(delivery).await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        NotifierCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            break Some(respond_to);
                        }
                    }
                }

                else => {
                    warn!("notifier channels closed, shutting down");
                    break None;
                }
            }
        };

        self.delivery_rx.close();
        while let Some(delivery) = self.delivery_rx.recv().await {
            self.start_delivery(delivery).await;
        }
        while self.tasks.join_next().await.is_some() {}

        debug!("notifier actor stopped");
        if let Some(respond_to) = shutdown_reply {
            let _ = respond_to.send(());
        }
    }
}

/// Handle for dispatching alert events to the notifier actor
#[derive(Clone)]
pub struct NotifierHandle {
    deliveries: mpsc::Sender<Delivery>,
    sender: mpsc::Sender<NotifierCommand>,
    audit: Arc<NotificationAudit>,
}

impl NotifierHandle {
    /// Spawn a new notifier actor
    pub fn spawn(
        config: &NotificationsConfig,
        targets: Arc<TargetDirectory>,
        audit: Arc<NotificationAudit>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        let (delivery_tx, delivery_rx) = mpsc::channel(config.queue_size.max(1));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = NotifierActor {
            context: DeliveryContext {
                targets,
                audit: audit.clone(),
                sender,
                timeout: Duration::from_secs(config.timeout_secs),
            },
            delivery_rx,
            command_rx: cmd_rx,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            tasks: JoinSet::new(),
        };

        tokio::spawn(actor.run());

        Self {
            deliveries: delivery_tx,
            sender: cmd_tx,
            audit,
        }
    }

    /// Finish queued and in-flight deliveries, then stop the actor
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(NotifierCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

impl AlertDispatch for NotifierHandle {
    fn dispatch(&self, target_id: TargetId, event: &AlertEvent) {
        let delivery = Delivery {
            target_id,
            event: event.clone(),
        };

        match self.deliveries.try_send(delivery) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(delivery)) => self.audit.record_failure(
                delivery.event.id,
                target_id,
                "unknown",
                None,
                "notification queue full",
            ),
            Err(mpsc::error::TrySendError::Closed(delivery)) => self.audit.record_failure(
                delivery.event.id,
                target_id,
                "unknown",
                None,
                "notifier is not running",
            ),
        }
    }
}
