//! Generic webhook notification provider.
//!
//! POSTs the message as JSON to a configured URL.

use super::provider::{NotificationMessage, NotificationProvider, NotificationResult};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::json;
use std::time::Instant;

/// Webhook notification provider
///
/// # Example
/// ```ignore
/// let provider = WebhookProvider::new(client, "https://example.com/hook")?;
/// let result = provider.send(&message).await?;
/// ```
pub struct WebhookProvider {
    client: reqwest::Client,
    url: Url,
}

impl WebhookProvider {
    /// Creates a new webhook provider
    ///
    /// Only http and https URLs are accepted.
    pub fn new(client: reqwest::Client, url: &str) -> AppResult<Self> {
        Ok(Self {
            client,
            url: parse_webhook_url("notifications.webhook_url", url)?,
        })
    }

    fn build_request_body(&self, message: &NotificationMessage) -> serde_json::Value {
        json!({
            "title": message.title,
            "body": message.body,
            "level": message.level,
            "metadata": message.metadata,
            "source": "diet-batch",
        })
    }
}

/// Parses and checks the scheme of a webhook URL
pub(super) fn parse_webhook_url(field: &str, url: &str) -> AppResult<Url> {
    let parsed = Url::parse(url).map_err(|_| AppError::Validation {
        field: field.to_string(),
        reason: "Invalid URL format".to_string(),
    })?;

    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(AppError::Validation {
            field: field.to_string(),
            reason: "URL must use http or https protocol".to_string(),
        });
    }
    Ok(parsed)
}

#[async_trait]
impl NotificationProvider for WebhookProvider {
    async fn send(&self, message: &NotificationMessage) -> AppResult<NotificationResult> {
        let start = Instant::now();

        let response = self
            .client
            .post(self.url.clone())
            .json(&self.build_request_body(message))
            .send()
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(NotificationResult::from_response(response, duration_ms).await)
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
