use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ClusterId, FleetError, FleetResult, HostId, ServiceId};

use super::rule::{ComparisonOperator, Severity};
use super::{EventId, RuleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AlertStatus::Open => "OPEN",
            AlertStatus::Acknowledged => "ACKNOWLEDGED",
            AlertStatus::Resolved => "RESOLVED",
        };
        f.write_str(name)
    }
}

/// A triggered rule for one (host, service) scope
///
/// Names are copied from the triggering sample so events can be displayed without lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: EventId,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub cluster_id: Option<ClusterId>,
    pub host_id: HostId,
    pub hostname: Option<String>,
    pub service_id: Option<ServiceId>,
    pub service_name: Option<String>,
    pub metric_name: String,
    pub metric_value: f64,
    pub threshold: f64,
    pub operator: ComparisonOperator,
    pub severity: Severity,
    pub status: AlertStatus,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertEvent {
    /// Not yet resolved; still suppresses new events for its scope.
    pub fn is_open(&self) -> bool {
        self.status != AlertStatus::Resolved
    }

    pub fn acknowledge(&mut self, user: impl ToString, at: DateTime<Utc>) -> FleetResult<()> {
        if self.status != AlertStatus::Open {
            return Err(FleetError::InvalidState(format!(
                "alert event {} is {}, only OPEN events can be acknowledged",
                self.id, self.status
            )));
        }

        self.status = AlertStatus::Acknowledged;
        self.acknowledged_at = Some(at);
        self.acknowledged_by = Some(user.to_string());
        Ok(())
    }

    pub fn resolve(&mut self, at: DateTime<Utc>) -> FleetResult<()> {
        if self.status == AlertStatus::Resolved {
            return Err(FleetError::InvalidState(format!(
                "alert event {} is already resolved",
                self.id
            )));
        }

        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(at);
        Ok(())
    }
}

/// Query filter for alert events; unset fields match everything
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    pub host_id: Option<HostId>,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn matches(&self, event: &AlertEvent) -> bool {
        self.status.is_none_or(|status| status == event.status)
            && self.severity.is_none_or(|severity| severity == event.severity)
            && self.host_id.is_none_or(|host_id| host_id == event.host_id)
    }
}

/// Event counts by status and severity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub total: usize,
    pub open: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    pub info: usize,
    pub warning: usize,
    pub critical: usize,
}

impl AlertStatistics {
    pub fn record(&mut self, event: &AlertEvent) {
        self.total += 1;

        match event.status {
            AlertStatus::Open => self.open += 1,
            AlertStatus::Acknowledged => self.acknowledged += 1,
            AlertStatus::Resolved => self.resolved += 1,
        }

        match event.severity {
            Severity::Info => self.info += 1,
            Severity::Warning => self.warning += 1,
            Severity::Critical => self.critical += 1,
        }
    }
}
