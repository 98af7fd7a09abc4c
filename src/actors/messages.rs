//! Message types for actor communication

use serde::Serialize;
use tokio::sync::oneshot;

use crate::alerting::AlertEvent;
use crate::notify::TargetId;

/// One alert event to deliver to one notification target
#[derive(Debug, Clone)]
pub struct Delivery {
    pub target_id: TargetId,
    pub event: AlertEvent,
}

/// Commands that can be sent to the NotifierActor
#[derive(Debug)]
pub enum NotifierCommand {
    /// Stop accepting deliveries, finish queued and in-flight ones, then exit
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Commands that can be sent to the ResultProcessorActor
#[derive(Debug)]
pub enum ResultProcessorCommand {
    /// Number of results applied so far
    GetProcessed { respond_to: oneshot::Sender<u64> },

    /// Apply results already queued, then exit
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Commands that can be sent to the HousekeepingActor
#[derive(Debug)]
pub enum HousekeepingCommand {
    /// Run a sweep immediately (bypassing the interval timer)
    RunNow {
        respond_to: oneshot::Sender<HousekeepingReport>,
    },

    Shutdown,
}

/// Outcome of one housekeeping sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HousekeepingReport {
    /// Metric samples deleted by retention
    pub samples_removed: usize,

    /// Hosts that went offline during this sweep
    pub hosts_offline: Vec<crate::HostId>,

    /// Commands given up for lack of a result
    pub commands_expired: Vec<String>,
}
