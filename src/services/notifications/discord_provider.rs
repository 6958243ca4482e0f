//! Discord webhook notification provider.
//!
//! Messages are rendered as a single embed: title, description, a colour
//! per level and one inline field per metadata entry.
//!
//! Discord API Reference: https://discord.com/developers/docs/resources/webhook

use super::provider::{NotificationMessage, NotificationProvider, NotificationResult};
use super::webhook_provider::parse_webhook_url;
use crate::error::AppResult;
use async_trait::async_trait;
use jiff::Timestamp;
use reqwest::Url;
use serde_json::json;
use std::time::Instant;

const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_VALUE_LIMIT: usize = 1024;
const MAX_FIELDS: usize = 25;

#[derive(Clone)]
pub struct DiscordProvider {
    client: reqwest::Client,
    webhook_url: Url,
}

impl DiscordProvider {
    pub fn new(client: reqwest::Client, webhook_url: &str) -> AppResult<Self> {
        Ok(Self {
            client,
            webhook_url: parse_webhook_url("notifications.discord_webhook_url", webhook_url)?,
        })
    }

    fn build_request_body(&self, message: &NotificationMessage) -> serde_json::Value {
        let fields: Vec<serde_json::Value> = message
            .metadata
            .iter()
            .take(MAX_FIELDS)
            .map(|(name, value)| {
                json!({
                    "name": name,
                    "value": clip(value, FIELD_VALUE_LIMIT),
                    "inline": true,
                })
            })
            .collect();

        json!({
            "username": "diet-batch",
            "embeds": [{
                "title": clip(&message.title, TITLE_LIMIT),
                "description": clip(&message.body, DESCRIPTION_LIMIT),
                "color": message.level.color(),
                "timestamp": Timestamp::now().to_string(),
                "fields": fields,
            }]
        })
    }
}

/// Cut `text` to at most `limit` characters, marking the cut with an ellipsis
fn clip(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(limit.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

#[async_trait]
impl NotificationProvider for DiscordProvider {
    async fn send(&self, message: &NotificationMessage) -> AppResult<NotificationResult> {
        let start = Instant::now();

        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&self.build_request_body(message))
            .send()
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(NotificationResult::from_response(response, duration_ms).await)
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::client::build_http_client;
    use crate::services::notifications::NotificationLevel;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(url: &str) -> DiscordProvider {
        DiscordProvider::new(build_http_client(Duration::from_secs(5)).unwrap(), url).unwrap()
    }

    #[test]
    fn test_build_request_body() {
        let provider = provider("https://discord.com/api/webhooks/1/abc");
        let message = NotificationMessage::new(NotificationLevel::Error, "Job failed", "timeout")
            .with_field("job_id", "daily_data_cleanup")
            .with_field("duration", "31m");

        let body = provider.build_request_body(&message);
        let embed = &body["embeds"][0];
        assert_eq!(embed["title"], "Job failed");
        assert_eq!(embed["description"], "timeout");
        assert_eq!(embed["color"], 0xE74C3C);
        assert_eq!(embed["fields"].as_array().unwrap().len(), 2);
        assert_eq!(embed["fields"][0]["name"], "duration");
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        assert_eq!(clip("法案法案", 10), "法案法案");
        assert_eq!(clip("法案法案", 3), "法案…");
    }

    #[tokio::test]
    async fn test_send_to_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/webhooks/1/abc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&format!("{}/api/webhooks/1/abc", server.uri()));
        let message = NotificationMessage::new(NotificationLevel::Info, "hello", "world");
        let result = provider.send(&message).await.unwrap();
        assert!(result.success);
    }
}
