//! Webhook notification delivery.

use async_trait::async_trait;
use common::{Error, Result};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;
use watchdog::{Notifier, Severity, StatusEvent};

/// Sends one chat message per state change to an incoming-webhook URL,
/// using Slack Block Kit formatting.
pub struct WebhookNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(Error::config)?;

        Ok(Self {
            http,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &StatusEvent) -> Result<()> {
        let payload = build_payload(event);
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(Error::notification)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::notification(format!(
                "webhook returned status {status}: {body}"
            )));
        }
        Ok(())
    }
}

/// Fallback notifier used when no webhook is configured: state changes
/// land in the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &StatusEvent) -> Result<()> {
        info!(
            name = %event.name,
            url = %event.url,
            status = %event.status,
            severity = ?event.severity,
            escalate = event.escalate,
            collection = %event.collection_label,
            "status change"
        );
        Ok(())
    }
}

fn field(label: &str, value: &str) -> Value {
    let value = if value.is_empty() { "N/A" } else { value };
    json!({ "type": "mrkdwn", "text": format!("*{label}:*\n{value}") })
}

/// Block Kit message for one status event.
pub fn build_payload(event: &StatusEvent) -> Value {
    let header_text = match event.severity {
        Severity::Error => ":rotating_light: Server health check failure",
        Severity::Recovery => ":white_check_mark: Server is now alive",
    };
    let header = if event.collection_label.is_empty() {
        header_text.to_string()
    } else {
        format!("{header_text} - {}", event.collection_label)
    };
    let circle = match event.severity {
        Severity::Error => "red_circle",
        Severity::Recovery => "large_green_circle",
    };

    let mut blocks = Vec::new();
    if event.escalate {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": "@channel" },
        }));
    }
    blocks.push(json!({
        "type": "header",
        "text": { "type": "plain_text", "text": header, "emoji": true },
    }));
    blocks.push(json!({
        "type": "section",
        "fields": [field("Server Name", &event.name), field("Server URL", &event.url)],
    }));
    blocks.push(json!({
        "type": "section",
        "fields": [
            { "type": "mrkdwn", "text": format!("*Status:*\n:{circle}: {}", event.status) },
            field("Last Updated", &event.last_update),
        ],
    }));
    blocks.push(json!({ "type": "divider" }));
    if let Some(link) = &event.source_link {
        blocks.push(json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": { "type": "plain_text", "text": "View in Google Sheets", "emoji": true },
                "value": "view_sheets",
                "url": link,
            }],
        }));
    }

    json!({ "blocks": blocks })
}
