//! Request and response bodies of the HTTP API
//!
//! Domain objects (components, deployments, rules, events, targets) are serialized as they are;
//! the types here only cover bodies with no domain counterpart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::alerting::EventId;
use crate::storage::QueryRange;
use crate::{ComponentId, HostId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub uptime_secs: i64,
    pub hosts: usize,
    pub pending_commands: usize,
    pub in_flight_commands: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub component_id: ComponentId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigureRequest {
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Returned by accept-and-queue endpoints; the outcome is observed later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
}

impl AcceptedResponse {
    pub fn deployment(id: String) -> Self {
        Self {
            deployment_id: Some(id),
            command_id: None,
        }
    }

    pub fn command(id: String) -> Self {
        Self {
            deployment_id: None,
            command_id: Some(id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgeRequest {
    pub user: String,
}

/// Query parameters for metric time range
#[derive(Debug, Default, Deserialize)]
pub struct MetricQuery {
    /// Only samples with this name
    pub metric: Option<String>,

    /// Start time (ISO 8601 format, default: 1 hour before `end`)
    pub start: Option<DateTime<Utc>>,

    /// End time (ISO 8601 format, default: now)
    pub end: Option<DateTime<Utc>>,

    /// Max results (default: 1000)
    pub limit: Option<usize>,
}

impl MetricQuery {
    pub fn into_range(self, host_id: HostId) -> QueryRange {
        let end = self.end.unwrap_or_else(Utc::now);
        let start = self.start.unwrap_or_else(|| end - chrono::Duration::hours(1));

        QueryRange {
            host_id,
            metric_name: self.metric,
            start: Some(start),
            end: Some(end),
            limit: Some(self.limit.unwrap_or(1000).min(10_000)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub alert_event_id: Option<EventId>,
}
