use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::alerting::EventId;

use super::TargetId;

const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

/// One notification delivery attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: u64,
    pub alert_event_id: EventId,
    pub target_id: TargetId,
    pub channel: String,
    pub status: DeliveryStatus,
    pub message: String,
    pub recipient: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Bounded, append-only history of delivery attempts
///
/// Recording never blocks on I/O, so it is safe from synchronous dispatch paths.
#[derive(Debug)]
pub struct NotificationAudit {
    records: Mutex<VecDeque<DeliveryRecord>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for NotificationAudit {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl NotificationAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub fn record_success(
        &self,
        alert_event_id: EventId,
        target_id: TargetId,
        channel: &str,
        recipient: Option<String>,
    ) {
        self.push(
            alert_event_id,
            target_id,
            channel,
            DeliveryStatus::Success,
            "delivered".to_string(),
            recipient,
        );
    }

    pub fn record_failure(
        &self,
        alert_event_id: EventId,
        target_id: TargetId,
        channel: &str,
        recipient: Option<String>,
        message: impl ToString,
    ) {
        let message = message.to_string();
        warn!("notification of alert event {alert_event_id} to target {target_id} failed: {message}");
        self.push(
            alert_event_id,
            target_id,
            channel,
            DeliveryStatus::Failed,
            message,
            recipient,
        );
    }

    fn push(
        &self,
        alert_event_id: EventId,
        target_id: TargetId,
        channel: &str,
        status: DeliveryStatus,
        message: String,
        recipient: Option<String>,
    ) {
        let record = DeliveryRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            alert_event_id,
            target_id,
            channel: channel.to_string(),
            status,
            message,
            recipient,
            sent_at: Utc::now(),
        };

        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Delivery attempts newest first, optionally for one alert event.
    pub fn history(&self, alert_event_id: Option<EventId>) -> Vec<DeliveryRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .filter(|record| alert_event_id.is_none_or(|id| record.alert_event_id == id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
