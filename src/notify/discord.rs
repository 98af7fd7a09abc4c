use serde::Serialize;

use crate::alerting::{AlertEvent, Severity};

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

fn field(name: &str, value: impl ToString, inline: bool) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value: value.to_string(),
        inline,
    }
}

/// Host label used in titles and footers
pub fn host_display(event: &AlertEvent) -> String {
    match &event.hostname {
        Some(hostname) => format!("{hostname} (#{})", event.host_id),
        None => format!("host #{}", event.host_id),
    }
}

pub fn build_alert_embed(event: &AlertEvent) -> Embed {
    let (title, color) = match event.severity {
        Severity::Critical => ("🔥 Critical Alert", 15158332), // Red
        Severity::Warning => ("⚠️ Warning Alert", 15105570),   // Orange
        Severity::Info => ("ℹ️ Alert", 5793266),               // Light blue
    };

    let mut fields = vec![
        field("📊 Value", format!("{:.2}", event.metric_value), true),
        field(
            "⚠️ Condition",
            format!("{} {:.2}", event.operator, event.threshold),
            true,
        ),
        field("🖥️ Host", host_display(event), true),
    ];

    if let Some(service) = &event.service_name {
        fields.push(field("🧩 Service", service, true));
    }

    Embed {
        title: Some(format!("{title}: {}", event.rule_name)),
        description: Some(event.message.clone()),
        color: Some(color),
        fields,
        footer: Some(EmbedFooter {
            text: format!("Alert #{} | {}", event.id, event.metric_name),
        }),
        timestamp: Some(event.triggered_at.to_rfc3339()),
    }
}

pub fn build_alert_message(event: &AlertEvent, user_id: Option<&str>) -> Message {
    let mut builder = MessageBuilder::new().add_embed(build_alert_embed(event));

    if let Some(user_id) = user_id {
        builder = builder.content(format!(
            "{} ({} ~ {:.2}) <@{user_id}>",
            event.rule_name,
            host_display(event),
            event.metric_value
        ));
    }

    builder.build()
}
