use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::{AgentCommand, AgentCommandResponse, FleetError, FleetResult, HostId};

#[derive(Debug)]
struct Queues {
    by_host: Mutex<HashMap<HostId, VecDeque<AgentCommand>>>,
    closed: AtomicBool,
    warn_depth: usize,
}

/// Per-host addressed command queues (consumer side)
///
/// Order is preserved per host. Nothing is ordered across hosts.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    queues: Arc<Queues>,
}

impl CommandChannel {
    pub fn new(warn_depth: usize) -> Self {
        Self {
            queues: Arc::new(Queues {
                by_host: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                warn_depth,
            }),
        }
    }

    /// Producer-only view handed to the deployment registry
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            queues: self.queues.clone(),
        }
    }

    /// Remove up to `max` commands addressed to `host_id`, oldest first.
    pub fn take_for_host(&self, host_id: HostId, max: usize) -> Vec<AgentCommand> {
        let mut by_host = self
            .queues
            .by_host
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(queue) = by_host.get_mut(&host_id) else {
            return Vec::new();
        };

        let count = max.min(queue.len());
        let commands: Vec<_> = queue.drain(..count).collect();

        if queue.is_empty() {
            by_host.remove(&host_id);
        }

        trace!("handing {} command(s) to host {host_id}", commands.len());
        commands
    }

    pub fn pending_for_host(&self, host_id: HostId) -> usize {
        self.queues
            .by_host
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&host_id)
            .map_or(0, VecDeque::len)
    }

    pub fn pending_total(&self) -> usize {
        self.queues
            .by_host
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(VecDeque::len)
            .sum()
    }

    /// Stop accepting commands; queued commands can still be drained.
    pub fn close(&self) {
        self.queues.closed.store(true, Ordering::SeqCst);
    }
}

/// Producer view of the command channel
#[derive(Debug, Clone)]
pub struct CommandSender {
    queues: Arc<Queues>,
}

impl CommandSender {
    /// Append a command to its host's queue. Never blocks.
    pub fn send(&self, command: AgentCommand) -> FleetResult<()> {
        if self.queues.closed.load(Ordering::SeqCst) {
            return Err(FleetError::TransportFailure(format!(
                "command channel closed, dropping {}",
                command.command_id
            )));
        }

        let host_id = command.host_id;
        let mut by_host = self
            .queues
            .by_host
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let queue = by_host.entry(host_id).or_default();
        queue.push_back(command);

        if queue.len() > self.queues.warn_depth {
            warn!(
                "command queue for host {host_id} holds {} commands (agent not polling?)",
                queue.len()
            );
        }

        Ok(())
    }
}

pub type ResultReceiver = mpsc::UnboundedReceiver<AgentCommandResponse>;

/// Sending half of the command result channel
#[derive(Debug, Clone)]
pub struct ResultSender {
    sender: mpsc::UnboundedSender<AgentCommandResponse>,
}

impl ResultSender {
    pub fn send(&self, response: AgentCommandResponse) -> FleetResult<()> {
        self.sender.send(response).map_err(|e| {
            FleetError::TransportFailure(format!(
                "result channel closed, dropping result for {}",
                e.0.command_id
            ))
        })
    }
}

pub fn result_channel() -> (ResultSender, ResultReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ResultSender { sender }, receiver)
}
