//! AgentSession - Heartbeat loop of the agent
//!
//! ```text
//! Timer tick / BeatNow ─► sample ─► heartbeat ─► new commands ─► worker queue
//!                                                                    │
//!                      report (held + resent until accepted) ◄── execute (with timeout)
//! ```
//!
//! Handing a command to the worker never waits, so a hung install cannot stall heartbeats.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::util::agent_version;
use crate::{AgentCommand, AgentCommandResponse, FleetError, FleetResult, HeartbeatRequest};

use super::client::HubClient;
use super::collector::MetricSampler;
use super::executor::CommandExecutor;
use super::runtime::ComponentRuntime;
use super::AgentConfig;

/// Command ids remembered to drop redeliveries
const RECENT_COMMANDS: usize = 256;

/// Results kept for resending while the hub is unreachable; the oldest is dropped beyond this
const MAX_UNREPORTED: usize = 1024;

#[derive(Debug)]
pub enum SessionCommand {
    /// Send a heartbeat immediately; responds with the number of new commands queued
    BeatNow {
        respond_to: oneshot::Sender<FleetResult<usize>>,
    },

    /// Stop the heartbeat loop and wait for queued commands to finish
    Shutdown { respond_to: oneshot::Sender<()> },
}

pub struct AgentSession {
    config: AgentConfig,
    client: HubClient,
    sampler: Box<dyn MetricSampler>,
    executor: CommandExecutor,
    work_tx: mpsc::UnboundedSender<AgentCommand>,
    worker: JoinHandle<()>,
    recent: VecDeque<String>,
    command_rx: mpsc::Receiver<SessionCommand>,
}

impl AgentSession {
    pub fn new(
        config: AgentConfig,
        sampler: Box<dyn MetricSampler>,
        runtime: Arc<dyn ComponentRuntime>,
        command_rx: mpsc::Receiver<SessionCommand>,
    ) -> FleetResult<Self> {
        let client = HubClient::new(&config.server_url, config.effective_timeout())?;
        let executor = CommandExecutor::new(runtime, config.work_dir.clone());

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let worker = CommandWorker {
            executor: executor.clone(),
            client: client.clone(),
            command_timeout: config.command_timeout,
            retry_every: config.heartbeat_interval,
            unreported: VecDeque::new(),
            work_rx,
        };
        let worker = tokio::spawn(worker.run());

        Ok(Self {
            config,
            client,
            sampler,
            executor,
            work_tx,
            worker,
            recent: VecDeque::with_capacity(RECENT_COMMANDS),
            command_rx,
        })
    }

    fn build_heartbeat(&mut self) -> HeartbeatRequest {
        let sample = self.sampler.sample();

        HeartbeatRequest {
            host_id: self.config.host_id,
            hostname: self.config.hostname.clone(),
            agent_version: Some(agent_version().to_string()),
            timestamp: Utc::now(),
            cpu_usage: sample.cpu_usage,
            memory_usage: sample.memory_usage,
            disk_usage: sample.disk_usage,
            metrics: sample.metrics,
            components: self.executor.component_reports(),
        }
    }

    /// Returns false for ids already handed to the worker.
    fn remember(&mut self, command_id: &str) -> bool {
        if self.recent.iter().any(|id| id == command_id) {
            return false;
        }

        if self.recent.len() == RECENT_COMMANDS {
            self.recent.pop_front();
        }
        self.recent.push_back(command_id.to_string());
        true
    }

    async fn beat(&mut self) -> FleetResult<usize> {
        let request = self.build_heartbeat();
        let limit = self.config.effective_timeout();

        let response = timeout(limit, self.client.heartbeat(&request))
            .await
            .map_err(|_| {
                FleetError::TransportFailure(format!("heartbeat timed out after {limit:?}"))
            })??;

        let mut queued = 0;
        for command in response.commands {
            if command.host_id != self.config.host_id {
                warn!(
                    "ignoring command {} addressed to host {}",
                    command.command_id, command.host_id
                );
                continue;
            }
            if !self.remember(&command.command_id) {
                debug!("ignoring redelivered command {}", command.command_id);
                continue;
            }

            trace!("queueing {} {}", command.kind, command.command_id);
            self.work_tx
                .send(command)
                .map_err(|_| FleetError::TransportFailure("command worker stopped".into()))?;
            queued += 1;
        }

        Ok(queued)
    }

    /// Run the session's main loop
    #[instrument(skip(self), fields(host_id = self.config.host_id))]
    pub async fn run(mut self) {
        info!(
            "agent reporting to {} every {:?}",
            self.config.server_url, self.config.heartbeat_interval
        );

        let mut ticker = interval(self.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown_reply = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.beat().await {
                        error!("heartbeat failed: {e}");
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SessionCommand::BeatNow { respond_to } => {
                            let _ = respond_to.send(self.beat().await);
                        }

                        SessionCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            break Some(respond_to);
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break None;
                }
            }
        };

        drop(self.work_tx);
        if let Err(e) = self.worker.await {
            error!("command worker panicked: {e}");
        }

        info!("agent session stopped");
        if let Some(respond_to) = shutdown_reply {
            let _ = respond_to.send(());
        }
    }
}

/// Executes commands one at a time in arrival order and reports each result
///
/// A result the hub did not accept stays queued and is resent, oldest first, after the next
/// command and on every retry tick.
struct CommandWorker {
    executor: CommandExecutor,
    client: HubClient,
    command_timeout: Duration,
    retry_every: Duration,
    unreported: VecDeque<AgentCommandResponse>,
    work_rx: mpsc::UnboundedReceiver<AgentCommand>,
}

impl CommandWorker {
    async fn execute(&self, command: &AgentCommand) -> AgentCommandResponse {
        match timeout(self.command_timeout, self.executor.execute(command)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(
                    "{} {} timed out after {:?}",
                    command.kind, command.command_id, self.command_timeout
                );
                AgentCommandResponse::failed(
                    &command.command_id,
                    format!("timed out after {:?}", self.command_timeout),
                )
            }
        }
    }

    fn hold(&mut self, response: AgentCommandResponse) {
        if self.unreported.len() >= MAX_UNREPORTED {
            if let Some(dropped) = self.unreported.pop_front() {
                error!("dropping unreported result of {}", dropped.command_id);
            }
        }
        self.unreported.push_back(response);
    }

    /// Send held results oldest first, stopping at the first failure.
    async fn flush(&mut self) {
        while let Some(response) = self.unreported.front() {
            if let Err(e) = self.client.report(response).await {
                warn!(
                    "failed to report result of {}: {e} ({} held)",
                    response.command_id,
                    self.unreported.len()
                );
                return;
            }

            trace!("reported result of {}", response.command_id);
            self.unreported.pop_front();
        }
    }

    #[instrument(skip(self))]
    async fn run(mut self) {
        let mut retry = interval(self.retry_every);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.work_rx.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    let response = self.execute(&command).await;
                    self.hold(response);
                    self.flush().await;
                }

                _ = retry.tick(), if !self.unreported.is_empty() => {
                    self.flush().await;
                }
            }
        }

        self.flush().await;
        if !self.unreported.is_empty() {
            error!("{} command result(s) never reached the hub", self.unreported.len());
        }

        debug!("command worker drained");
    }
}

#[derive(Debug, Clone)]
pub struct AgentHandle {
    sender: mpsc::Sender<SessionCommand>,
}

impl AgentHandle {
    pub fn spawn(
        config: AgentConfig,
        sampler: Box<dyn MetricSampler>,
        runtime: Arc<dyn ComponentRuntime>,
    ) -> FleetResult<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let session = AgentSession::new(config, sampler, runtime, cmd_rx)?;

        tokio::spawn(session.run());

        Ok(Self { sender: cmd_tx })
    }

    /// Heartbeat now instead of waiting for the next tick
    pub async fn beat_now(&self) -> FleetResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::BeatNow { respond_to: tx })
            .await
            .map_err(|_| FleetError::TransportFailure("agent session is not running".into()))?;

        rx.await
            .map_err(|_| FleetError::TransportFailure("agent session stopped".into()))?
    }

    /// Stop heartbeating and wait until every queued command is executed (or timed out) and its
    /// result sent
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SessionCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}
