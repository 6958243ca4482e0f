//! Notification fan-out.
//!
//! Every message goes to all configured providers. Failures are logged and
//! reported back, never raised; callers that do not care use
//! [`NotificationService::notify`] and move on.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::discord_provider::DiscordProvider;
use super::provider::{NotificationMessage, NotificationProvider, NotificationResult};
use super::webhook_provider::WebhookProvider;
use crate::config::settings::NotificationsConfig;
use crate::error::AppResult;
use crate::external::client::build_http_client;

/// Outcome of one provider for one message
#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub provider: &'static str,
    #[serde(flatten)]
    pub result: NotificationResult,
}

#[derive(Clone)]
pub struct NotificationService {
    providers: Arc<Vec<Arc<dyn NotificationProvider>>>,
}

impl NotificationService {
    /// Builds the providers named in `config`.
    ///
    /// Disabled notifications, or no URL configured, give a service that
    /// drops every message.
    pub fn from_config(config: &NotificationsConfig) -> AppResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let client = build_http_client(Duration::from_secs(config.timeout_seconds))?;
        let mut providers: Vec<Arc<dyn NotificationProvider>> = Vec::new();
        if !config.discord_webhook_url.is_empty() {
            providers.push(Arc::new(DiscordProvider::new(
                client.clone(),
                &config.discord_webhook_url,
            )?));
        }
        if !config.webhook_url.is_empty() {
            providers.push(Arc::new(WebhookProvider::new(client, &config.webhook_url)?));
        }

        if providers.is_empty() {
            tracing::warn!("Notifications enabled but no webhook URL configured");
        }
        Ok(Self::with_providers(providers))
    }

    pub fn with_providers(providers: Vec<Arc<dyn NotificationProvider>>) -> Self {
        Self {
            providers: Arc::new(providers),
        }
    }

    pub fn disabled() -> Self {
        Self::with_providers(Vec::new())
    }

    pub fn is_enabled(&self) -> bool {
        !self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Deliver `message` to every provider and report each outcome
    pub async fn send(&self, message: &NotificationMessage) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(self.providers.len());

        for provider in self.providers.iter() {
            let result = match provider.send(message).await {
                Ok(result) => result,
                Err(e) => NotificationResult {
                    success: false,
                    status_code: None,
                    response: Some(e.to_string()),
                    duration_ms: 0,
                },
            };

            if result.success {
                tracing::debug!(
                    provider = provider.name(),
                    title = %message.title,
                    duration_ms = result.duration_ms,
                    "Notification delivered"
                );
            } else {
                tracing::warn!(
                    provider = provider.name(),
                    title = %message.title,
                    status_code = ?result.status_code,
                    response = result.response.as_deref().unwrap_or_default(),
                    "Notification delivery failed"
                );
            }

            deliveries.push(Delivery {
                provider: provider.name(),
                result,
            });
        }

        deliveries
    }

    /// Fire-and-forget delivery on a background task
    pub fn notify(&self, message: NotificationMessage) {
        if !self.is_enabled() {
            tracing::debug!(title = %message.title, "Notifications disabled, message dropped");
            return;
        }
        let service = self.clone();
        tokio::spawn(async move {
            service.send(&message).await;
        });
    }
}
