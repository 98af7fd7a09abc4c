use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::notify::TargetId;
use crate::{ClusterId, FleetError, FleetResult, HostId, ServiceId};

use super::RuleId;
use super::evaluator::MetricObservation;

/// Longest sustained-breach window a rule may ask for (one leap year)
pub const MAX_RULE_DURATION_SECS: u64 = 366 * 24 * 60 * 60;

/// Comparison applied as `value <operator> threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComparisonOperator {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl ComparisonOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
        }
    }

    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThan => value > threshold,
            ComparisonOperator::GreaterOrEqual => value >= threshold,
            ComparisonOperator::LessThan => value < threshold,
            ComparisonOperator::LessOrEqual => value <= threshold,
            ComparisonOperator::Equal => value == threshold,
            ComparisonOperator::NotEqual => value != threshold,
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(ComparisonOperator::GreaterThan),
            ">=" => Ok(ComparisonOperator::GreaterOrEqual),
            "<" => Ok(ComparisonOperator::LessThan),
            "<=" => Ok(ComparisonOperator::LessOrEqual),
            "==" | "=" => Ok(ComparisonOperator::Equal),
            "!=" => Ok(ComparisonOperator::NotEqual),
            other => Err(FleetError::InvalidInput(format!(
                "unsupported comparison operator '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for ComparisonOperator {
    type Error = FleetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComparisonOperator> for String {
    fn from(operator: ComparisonOperator) -> Self {
        operator.symbol().to_string()
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Unvalidated rule as supplied by an operator or the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRuleDraft {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub metric_name: String,

    /// Scope; `None` matches any cluster
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,

    /// Scope; `None` matches any service
    #[serde(default)]
    pub service_id: Option<ServiceId>,

    /// Scope; `None` matches any host
    #[serde(default)]
    pub host_id: Option<HostId>,

    pub operator: String,

    pub threshold: f64,

    /// Minimum time the condition must hold before an event is raised
    #[serde(default)]
    pub duration_secs: u64,

    #[serde(default = "default_severity")]
    pub severity: Severity,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub notification_ids: Vec<TargetId>,
}

fn default_severity() -> Severity {
    Severity::Warning
}

fn default_enabled() -> bool {
    true
}

impl AlertRuleDraft {
    /// Validate the draft and turn it into a rule with the given id.
    pub fn into_rule(self, id: RuleId, now: DateTime<Utc>) -> FleetResult<AlertRule> {
        if self.name.trim().is_empty() {
            return Err(FleetError::InvalidInput("rule name must not be empty".into()));
        }
        if self.metric_name.trim().is_empty() {
            return Err(FleetError::InvalidInput("rule metric name must not be empty".into()));
        }
        if !self.threshold.is_finite() {
            return Err(FleetError::InvalidInput(format!(
                "rule threshold must be finite, got {}",
                self.threshold
            )));
        }
        if self.duration_secs > MAX_RULE_DURATION_SECS {
            return Err(FleetError::InvalidInput(format!(
                "rule duration must be at most {MAX_RULE_DURATION_SECS}s, got {}s",
                self.duration_secs
            )));
        }
        let operator = self.operator.parse()?;

        Ok(AlertRule {
            id,
            name: self.name,
            description: self.description,
            metric_name: self.metric_name,
            cluster_id: self.cluster_id,
            service_id: self.service_id,
            host_id: self.host_id,
            operator,
            threshold: self.threshold,
            duration_secs: self.duration_secs,
            severity: self.severity,
            enabled: self.enabled,
            notification_ids: self.notification_ids,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Standing condition on a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: RuleId,
    pub name: String,
    pub description: String,
    pub metric_name: String,
    pub cluster_id: Option<ClusterId>,
    pub service_id: Option<ServiceId>,
    pub host_id: Option<HostId>,
    pub operator: ComparisonOperator,
    pub threshold: f64,
    pub duration_secs: u64,
    pub severity: Severity,
    pub enabled: bool,
    pub notification_ids: Vec<TargetId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    /// Whether the rule is enabled, watches this metric and every scope field it sets
    /// equals the observation's.
    pub fn applies_to(&self, observation: &MetricObservation) -> bool {
        fn scope_matches<T: PartialEq>(rule: Option<T>, observed: Option<T>) -> bool {
            rule.is_none() || rule == observed
        }

        self.enabled
            && self.metric_name == observation.metric_name
            && scope_matches(self.host_id, Some(observation.host_id))
            && scope_matches(self.service_id, observation.service_id)
            && scope_matches(self.cluster_id, observation.cluster_id)
    }

    /// How long a breach must persist before firing. `None` when the stored duration does
    /// not fit a [`TimeDelta`].
    pub fn required_duration(&self) -> Option<TimeDelta> {
        i64::try_from(self.duration_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
    }

    pub fn is_breached_by(&self, value: f64) -> bool {
        self.operator.evaluate(value, self.threshold)
    }

    pub fn is_global(&self) -> bool {
        self.host_id.is_none() && self.service_id.is_none() && self.cluster_id.is_none()
    }
}
