use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::{FleetError, FleetResult};

use super::TargetId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTarget {
    pub id: TargetId,
    pub name: String,

    /// Disabled targets are skipped without an audit record
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub channel: Channel,
}

fn default_enabled() -> bool {
    true
}

impl NotificationTarget {
    pub fn validate(&self) -> FleetResult<()> {
        if self.id == 0 {
            return Err(FleetError::InvalidInput("target id must be non-zero".into()));
        }
        if self.name.trim().is_empty() {
            return Err(FleetError::InvalidInput("target name must not be empty".into()));
        }
        if self.channel.url().trim().is_empty() {
            return Err(FleetError::InvalidInput("target url must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Discord(DiscordChannel),
    Webhook(WebhookChannel),
}

impl Channel {
    pub fn kind(&self) -> &'static str {
        match self {
            Channel::Discord(_) => "discord",
            Channel::Webhook(_) => "webhook",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Channel::Discord(discord) => &discord.url,
            Channel::Webhook(webhook) => &webhook.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordChannel {
    pub url: String,

    /// User mentioned in the message content
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookChannel {
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_method() -> String {
    "POST".to_string()
}

/// Registered notification targets
#[derive(Debug, Default)]
pub struct TargetDirectory {
    targets: RwLock<BTreeMap<TargetId, NotificationTarget>>,
}

impl TargetDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert or replace a target.
    pub async fn upsert(&self, target: NotificationTarget) -> FleetResult<()> {
        target.validate()?;
        info!("registered {} notification target {}", target.channel.kind(), target.id);
        self.targets.write().await.insert(target.id, target);
        Ok(())
    }

    pub async fn get(&self, target_id: TargetId) -> FleetResult<NotificationTarget> {
        self.targets
            .read()
            .await
            .get(&target_id)
            .cloned()
            .ok_or_else(|| FleetError::not_found("notification target", target_id))
    }

    pub async fn list(&self) -> Vec<NotificationTarget> {
        self.targets.read().await.values().cloned().collect()
    }

    pub async fn remove(&self, target_id: TargetId) -> FleetResult<NotificationTarget> {
        self.targets
            .write()
            .await
            .remove(&target_id)
            .ok_or_else(|| FleetError::not_found("notification target", target_id))
    }
}
