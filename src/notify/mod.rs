//! Notification delivery for alert events
//!
//! The evaluator only sees [`AlertDispatch`], a non-blocking hand-off. Actual delivery happens
//! in the notifier actor through a [`NotificationSender`], and every attempt lands in the
//! [`NotificationAudit`].

pub mod audit;
pub mod discord;
pub mod sender;
pub mod target;

use async_trait::async_trait;

use crate::FleetResult;
use crate::alerting::AlertEvent;

pub use audit::{DeliveryRecord, DeliveryStatus, NotificationAudit};
pub use sender::HttpSender;
pub use target::{Channel, DiscordChannel, NotificationTarget, TargetDirectory, WebhookChannel};

pub type TargetId = u64;

/// Hand an alert event to a notification target without waiting for delivery.
pub trait AlertDispatch: Send + Sync {
    fn dispatch(&self, target_id: TargetId, event: &AlertEvent);
}

/// Renders and delivers one alert event to one target.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, target: &NotificationTarget, event: &AlertEvent) -> FleetResult<()>;
}
