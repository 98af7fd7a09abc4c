//! ResultProcessorActor - Applies agent command results to the deployment registry
//!
//! Agents report results over HTTP; the handler pushes them onto the result channel and returns
//! immediately. This actor drains the channel in order.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

use crate::command::ResultReceiver;
use crate::deploy::{DeploymentRegistry, ResultDisposition};

use super::messages::ResultProcessorCommand;

pub struct ResultProcessorActor {
    registry: Arc<DeploymentRegistry>,
    result_rx: ResultReceiver,
    command_rx: mpsc::Receiver<ResultProcessorCommand>,
    processed: u64,
}

impl ResultProcessorActor {
    pub fn new(
        registry: Arc<DeploymentRegistry>,
        result_rx: ResultReceiver,
        command_rx: mpsc::Receiver<ResultProcessorCommand>,
    ) -> Self {
        Self {
            registry,
            result_rx,
            command_rx,
            processed: 0,
        }
    }

    async fn apply(&mut self, response: crate::AgentCommandResponse) {
        let disposition = self.registry.process_command_result(&response).await;
        if disposition != ResultDisposition::Discarded {
            self.processed += 1;
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting result processor");

        let shutdown_reply = loop {
            tokio::select! {
                Some(response) = self.result_rx.recv() => {
                    self.apply(response).await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ResultProcessorCommand::GetProcessed { respond_to } => {
                            let _ = respond_to.send(self.processed);
                        }

                        ResultProcessorCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            break Some(respond_to);
                        }
                    }
                }

                else => {
                    warn!("result channel closed, shutting down");
                    break None;
                }
            }
        };

        while let Ok(response) = self.result_rx.try_recv() {
            self.apply(response).await;
        }

        debug!("result processor stopped after {} results", self.processed);
        if let Some(respond_to) = shutdown_reply {
            let _ = respond_to.send(());
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultProcessorHandle {
    sender: mpsc::Sender<ResultProcessorCommand>,
}

impl ResultProcessorHandle {
    pub fn spawn(registry: Arc<DeploymentRegistry>, result_rx: ResultReceiver) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let actor = ResultProcessorActor::new(registry, result_rx, cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Results that correlated with an issued command
    pub async fn processed(&self) -> Option<u64> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ResultProcessorCommand::GetProcessed { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Apply already queued results, then stop
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(ResultProcessorCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}
