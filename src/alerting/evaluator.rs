use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, trace, warn};

use crate::notify::{AlertDispatch, TargetId};
use crate::{ClusterId, FleetError, FleetResult, HostId, MetricSample, ServiceId};

use super::event::{AlertEvent, AlertStatistics, AlertStatus, EventFilter};
use super::rule::{AlertRule, AlertRuleDraft};
use super::{EventId, RuleId};

/// Deduplication scope of an alert event
type ScopeKey = (RuleId, HostId, Option<ServiceId>);

/// A single metric value as seen by the evaluator
#[derive(Debug, Clone, PartialEq)]
pub struct MetricObservation {
    pub host_id: HostId,
    pub hostname: Option<String>,
    pub cluster_id: Option<ClusterId>,
    pub service_id: Option<ServiceId>,
    pub service_name: Option<String>,
    pub metric_name: String,
    pub value: f64,
}

impl MetricObservation {
    pub fn new(host_id: HostId, metric_name: impl ToString, value: f64) -> Self {
        Self {
            host_id,
            hostname: None,
            cluster_id: None,
            service_id: None,
            service_name: None,
            metric_name: metric_name.to_string(),
            value,
        }
    }

    pub fn from_sample(
        host_id: HostId,
        hostname: Option<String>,
        cluster_id: Option<ClusterId>,
        sample: &MetricSample,
    ) -> Self {
        Self {
            host_id,
            hostname,
            cluster_id,
            service_id: sample.service_id,
            service_name: sample.service_name.clone(),
            metric_name: sample.name.clone(),
            value: sample.value,
        }
    }
}

#[derive(Debug, Default)]
struct RuleBook {
    rules: BTreeMap<RuleId, AlertRule>,
    last_id: RuleId,
}

#[derive(Debug, Default)]
struct EventBook {
    events: BTreeMap<EventId, AlertEvent>,

    /// Unresolved event per scope
    open_index: HashMap<ScopeKey, EventId>,

    /// First breach time of scopes waiting for their rule's duration
    pending_since: HashMap<ScopeKey, DateTime<Utc>>,

    last_id: EventId,
}

impl EventBook {
    fn open_event(
        &mut self,
        rule: &AlertRule,
        observation: &MetricObservation,
        now: DateTime<Utc>,
    ) -> AlertEvent {
        self.last_id += 1;

        let event = AlertEvent {
            id: self.last_id,
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            cluster_id: observation.cluster_id,
            host_id: observation.host_id,
            hostname: observation.hostname.clone(),
            service_id: observation.service_id,
            service_name: observation.service_name.clone(),
            metric_name: observation.metric_name.clone(),
            metric_value: observation.value,
            threshold: rule.threshold,
            operator: rule.operator,
            severity: rule.severity,
            status: AlertStatus::Open,
            message: format!(
                "{}: {} {:.2} {} {:.2}",
                rule.name, observation.metric_name, observation.value, rule.operator, rule.threshold
            ),
            triggered_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
        };

        self.open_index
            .insert((rule.id, observation.host_id, observation.service_id), event.id);
        self.events.insert(event.id, event.clone());
        event
    }
}

/// Evaluates metric observations against alert rules and keeps the resulting events
///
/// Rules and events sit behind separate locks. Notification dispatch happens after both are
/// released.
pub struct AlertEvaluator {
    rules: RwLock<RuleBook>,
    events: RwLock<EventBook>,
    dispatcher: Option<Arc<dyn AlertDispatch>>,
    auto_resolve: bool,
}

impl AlertEvaluator {
    pub fn new(auto_resolve: bool) -> Self {
        Self {
            rules: RwLock::new(RuleBook::default()),
            events: RwLock::new(EventBook::default()),
            dispatcher: None,
            auto_resolve,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn AlertDispatch>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Evaluate one observation; returns the events it opened.
    pub async fn process_metric(&self, observation: &MetricObservation) -> Vec<AlertEvent> {
        self.process_metric_at(observation, Utc::now()).await
    }

    /// [`AlertEvaluator::process_metric`] with an explicit clock
    #[instrument(skip(self, observation), fields(host_id = observation.host_id, metric = %observation.metric_name))]
    pub async fn process_metric_at(
        &self,
        observation: &MetricObservation,
        now: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        let applicable: Vec<AlertRule> = self
            .rules
            .read()
            .await
            .rules
            .values()
            .filter(|rule| rule.applies_to(observation))
            .cloned()
            .collect();

        if applicable.is_empty() {
            return Vec::new();
        }

        let mut opened: Vec<(AlertEvent, Vec<TargetId>)> = Vec::new();

        {
            let mut book = self.events.write().await;

            for rule in &applicable {
                let key = (rule.id, observation.host_id, observation.service_id);

                if !rule.is_breached_by(observation.value) {
                    book.pending_since.remove(&key);

                    if self.auto_resolve {
                        if let Some(event_id) = book.open_index.remove(&key) {
                            if let Some(event) = book.events.get_mut(&event_id) {
                                match event.resolve(now) {
                                    Ok(()) => info!("alert event {event_id} recovered"),
                                    Err(e) => trace!("alert event {event_id} not auto-resolved: {e}"),
                                }
                            }
                        }
                    }
                    continue;
                }

                if book.open_index.contains_key(&key) {
                    trace!("rule {} already has an open event, suppressing", rule.id);
                    continue;
                }

                if rule.duration_secs > 0 {
                    let Some(required) = rule.required_duration() else {
                        warn!(
                            "rule {} has an unusable duration of {}s, skipping",
                            rule.id, rule.duration_secs
                        );
                        continue;
                    };
                    let since = *book.pending_since.entry(key).or_insert(now);

                    if now.signed_duration_since(since) < required {
                        trace!("rule {} breached since {since}, waiting", rule.id);
                        continue;
                    }
                }

                book.pending_since.remove(&key);
                let event = book.open_event(rule, observation, now);
                info!(
                    "alert event {} opened: {} [{}]",
                    event.id, event.message, event.severity
                );
                opened.push((event, rule.notification_ids.clone()));
            }
        }

        if let Some(dispatcher) = &self.dispatcher {
            for (event, targets) in &opened {
                for target_id in targets {
                    dispatcher.dispatch(*target_id, event);
                }
            }
        }

        opened.into_iter().map(|(event, _)| event).collect()
    }

    pub async fn acknowledge(&self, event_id: EventId, user: &str) -> FleetResult<AlertEvent> {
        let mut book = self.events.write().await;
        let event = book
            .events
            .get_mut(&event_id)
            .ok_or_else(|| FleetError::not_found("alert event", event_id))?;

        event.acknowledge(user, Utc::now())?;
        debug!("alert event {event_id} acknowledged by {user}");
        Ok(event.clone())
    }

    pub async fn resolve(&self, event_id: EventId) -> FleetResult<AlertEvent> {
        let mut book = self.events.write().await;
        let event = book
            .events
            .get_mut(&event_id)
            .ok_or_else(|| FleetError::not_found("alert event", event_id))?;

        event.resolve(Utc::now())?;
        let resolved = event.clone();

        let key = (resolved.rule_id, resolved.host_id, resolved.service_id);
        if book.open_index.get(&key) == Some(&event_id) {
            book.open_index.remove(&key);
        }

        debug!("alert event {event_id} resolved");
        Ok(resolved)
    }

    pub async fn get_event(&self, event_id: EventId) -> FleetResult<AlertEvent> {
        self.events
            .read()
            .await
            .events
            .get(&event_id)
            .cloned()
            .ok_or_else(|| FleetError::not_found("alert event", event_id))
    }

    /// Matching events, newest first
    pub async fn list_events(&self, filter: &EventFilter) -> Vec<AlertEvent> {
        let book = self.events.read().await;
        let matching = book
            .events
            .values()
            .rev()
            .filter(|event| filter.matches(event))
            .cloned();

        match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    pub async fn statistics(&self) -> AlertStatistics {
        let book = self.events.read().await;
        let mut stats = AlertStatistics::default();
        for event in book.events.values() {
            stats.record(event);
        }
        stats
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_rule(&self, draft: AlertRuleDraft) -> FleetResult<AlertRule> {
        let mut book = self.rules.write().await;
        let rule = draft.into_rule(book.last_id + 1, Utc::now())?;

        book.last_id = rule.id;
        book.rules.insert(rule.id, rule.clone());
        info!("created alert rule {}", rule.id);
        Ok(rule)
    }

    /// Replace a rule's definition. Pending duration state of the rule is reset.
    pub async fn update_rule(&self, rule_id: RuleId, draft: AlertRuleDraft) -> FleetResult<AlertRule> {
        let rule = {
            let mut book = self.rules.write().await;
            let existing = book
                .rules
                .get(&rule_id)
                .ok_or_else(|| FleetError::not_found("alert rule", rule_id))?;

            let created_at = existing.created_at;
            let mut rule = draft.into_rule(rule_id, Utc::now())?;
            rule.created_at = created_at;

            book.rules.insert(rule_id, rule.clone());
            rule
        };

        self.clear_pending(rule_id).await;
        debug!("updated alert rule {rule_id}");
        Ok(rule)
    }

    /// Remove a rule. Its events are kept; its pending duration state is dropped.
    pub async fn delete_rule(&self, rule_id: RuleId) -> FleetResult<AlertRule> {
        let removed = self
            .rules
            .write()
            .await
            .rules
            .remove(&rule_id)
            .ok_or_else(|| FleetError::not_found("alert rule", rule_id))?;

        self.clear_pending(rule_id).await;
        info!("deleted alert rule {rule_id}");
        Ok(removed)
    }

    pub async fn get_rule(&self, rule_id: RuleId) -> FleetResult<AlertRule> {
        self.rules
            .read()
            .await
            .rules
            .get(&rule_id)
            .cloned()
            .ok_or_else(|| FleetError::not_found("alert rule", rule_id))
    }

    pub async fn list_rules(&self) -> Vec<AlertRule> {
        self.rules.read().await.rules.values().cloned().collect()
    }

    async fn clear_pending(&self, rule_id: RuleId) {
        self.events
            .write()
            .await
            .pending_since
            .retain(|(id, _, _), _| *id != rule_id);
    }
}

impl std::fmt::Debug for AlertEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEvaluator")
            .field("auto_resolve", &self.auto_resolve)
            .field("has_dispatcher", &self.dispatcher.is_some())
            .finish()
    }
}
