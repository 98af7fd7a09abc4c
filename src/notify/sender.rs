use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::json;
use tracing::{error, info, instrument};

use crate::alerting::AlertEvent;
use crate::{FleetError, FleetResult};

use super::discord::{build_alert_message, host_display};
use super::target::{Channel, DiscordChannel, NotificationTarget, WebhookChannel};
use super::NotificationSender;

/// Delivers alert events to Discord and generic webhooks over HTTP
#[derive(Debug, Clone, Default)]
pub struct HttpSender {
    client: Client,
}

impl HttpSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[instrument(skip(self, discord, event), fields(event_id = event.id))]
    async fn send_discord(&self, discord: &DiscordChannel, event: &AlertEvent) -> FleetResult<()> {
        let message = build_alert_message(event, discord.user_id.as_deref());
        let response = self.client.post(&discord.url).json(&message).send().await?;

        if response.status().is_success() {
            info!("successfully sent Discord message");
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("Discord message failed with status {status}: {body}");
        Err(FleetError::TransportFailure(format!(
            "discord responded with {status}"
        )))
    }

    #[instrument(skip(self, webhook, event), fields(event_id = event.id))]
    async fn send_webhook(&self, webhook: &WebhookChannel, event: &AlertEvent) -> FleetResult<()> {
        let method = Method::from_bytes(webhook.method.to_uppercase().as_bytes()).map_err(|_| {
            FleetError::InvalidInput(format!("invalid webhook method '{}'", webhook.method))
        })?;

        let payload = json!({
            "message": event.message,
            "alert_event_id": event.id,
            "rule_id": event.rule_id,
            "rule": event.rule_name,
            "severity": event.severity,
            "status": event.status,
            "host_id": event.host_id,
            "host": host_display(event),
            "service": event.service_name,
            "metric": event.metric_name,
            "value": event.metric_value,
            "operator": event.operator,
            "threshold": event.threshold,
            "timestamp": event.triggered_at.to_rfc3339(),
        });

        let mut request = self.client.request(method, &webhook.url).json(&payload);
        for (name, value) in &webhook.headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            info!("successfully sent webhook alert");
            Ok(())
        } else {
            error!("webhook alert failed with status: {}", response.status());
            Err(FleetError::TransportFailure(format!(
                "webhook responded with {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl NotificationSender for HttpSender {
    async fn send(&self, target: &NotificationTarget, event: &AlertEvent) -> FleetResult<()> {
        match &target.channel {
            Channel::Discord(discord) => self.send_discord(discord, event).await,
            Channel::Webhook(webhook) => self.send_webhook(webhook, event).await,
        }
    }
}
