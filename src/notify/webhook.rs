use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use super::{NotificationEvent, NotificationProvider};

const MESSAGE_LIMIT: usize = 4096;

/// Posts JSON messages to an incoming chat webhook.
pub struct ChatWebhookClient {
    webhook_url: Url,
    client: Client,
}

impl ChatWebhookClient {
    pub fn new(webhook_url: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .context("failed to build webhook http client")?;

        Ok(Self {
            webhook_url,
            client,
        })
    }

    pub async fn forward(&self, payload: &Value) -> Result<()> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(payload)
            .send()
            .await
            .map_err(sanitize_reqwest_error)?;

        if response.status().is_success() {
            return Ok(());
        }

        Err(anyhow!(
            "chat webhook returned non-success status: {}",
            response.status()
        ))
    }
}

#[async_trait]
impl NotificationProvider for ChatWebhookClient {
    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        let text = format_message(event);
        self.forward(&json!({ "text": text })).await
    }

    fn provider_name(&self) -> &'static str {
        "chat_webhook"
    }
}

pub fn format_message(event: &NotificationEvent) -> String {
    let mut lines = Vec::with_capacity(event.fields.len() + 2);

    lines.push(format!("*{}* `{}`", event.title, event.tracking_id));
    for (key, value) in &event.fields {
        if value.trim().is_empty() {
            continue;
        }
        lines.push(format!("{}: {}", key, value.trim()));
    }
    lines.push(format!("_{}_", event.display_timestamp()));

    truncate_message(lines.join("\n"))
}

fn sanitize_reqwest_error(error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("chat webhook request timed out");
    }
    if error.is_connect() {
        return anyhow!("chat webhook connection failed");
    }
    anyhow!("chat webhook request failed")
}

fn truncate_message(content: String) -> String {
    const SUFFIX: &str = "\n… (truncated)";

    if content.chars().count() <= MESSAGE_LIMIT {
        return content;
    }

    let allowed = MESSAGE_LIMIT.saturating_sub(SUFFIX.chars().count());
    let mut truncated: String = content.chars().take(allowed).collect();
    truncated.push_str(SUFFIX);
    truncated
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{format_message, truncate_message, MESSAGE_LIMIT};
    use crate::notify::NotificationEvent;

    fn event(fields: Vec<(&str, &str)>) -> NotificationEvent {
        NotificationEvent {
            title: "New delivery request".to_string(),
            tracking_id: "MD-ABCD2345".to_string(),
            timestamp: Utc::now(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn message_has_title_fields_and_timestamp() {
        let text = format_message(&event(vec![
            ("Pickup", "General Hospital"),
            ("Priority", "urgent"),
        ]));
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "*New delivery request* `MD-ABCD2345`");
        assert_eq!(lines[1], "Pickup: General Hospital");
        assert_eq!(lines[2], "Priority: urgent");
        assert!(lines[3].ends_with("UTC_"));
    }

    #[test]
    fn blank_fields_are_skipped() {
        let text = format_message(&event(vec![("Company", "  ")]));
        assert!(!text.contains("Company"));
    }

    #[test]
    fn long_messages_are_truncated_to_limit() {
        let long = "x".repeat(MESSAGE_LIMIT * 2);
        let out = truncate_message(long);
        assert_eq!(out.chars().count(), MESSAGE_LIMIT);
        assert!(out.ends_with("(truncated)"));
    }
}
