//! Core notification provider trait and types.
//!
//! This module provides the abstraction for notification providers,
//! allowing easy extension to support different notification channels.

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationLevel {
    /// Embed colour used by Discord
    pub fn color(&self) -> u32 {
        match self {
            NotificationLevel::Info => 0x3498DB,
            NotificationLevel::Success => 0x2ECC71,
            NotificationLevel::Warning => 0xF39C12,
            NotificationLevel::Error => 0xE74C3C,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Success => "success",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message to be sent via notification provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Message title/subject
    pub title: String,
    /// Message body/content
    pub body: String,
    pub level: NotificationLevel,
    /// Key/value details rendered as fields where the provider supports it
    pub metadata: BTreeMap<String, String>,
}

impl NotificationMessage {
    pub fn new(level: NotificationLevel, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            level,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

/// Result of a notification send attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    /// Whether send was successful
    pub success: bool,
    /// HTTP status code or provider-specific status
    pub status_code: Option<u16>,
    /// Response body or error message
    pub response: Option<String>,
    /// Time taken for the operation in milliseconds
    pub duration_ms: u64,
}

impl NotificationResult {
    pub(crate) async fn from_response(
        response: Result<reqwest::Response, reqwest::Error>,
        duration_ms: u64,
    ) -> Self {
        match response {
            Ok(resp) => {
                let status = resp.status();
                Self {
                    success: status.is_success(),
                    status_code: Some(status.as_u16()),
                    response: resp.text().await.ok().filter(|t| !t.is_empty()),
                    duration_ms,
                }
            }
            // Transport errors become a failed result rather than an error
            Err(e) => Self {
                success: false,
                status_code: None,
                response: Some(e.to_string()),
                duration_ms,
            },
        }
    }
}

/// Trait for notification sinks (Discord, generic webhook, ...)
///
/// All providers must be Send + Sync for use in async contexts.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Sends a notification message
    ///
    /// # Returns
    /// Result containing send outcome details (success, status, duration, etc.)
    async fn send(&self, message: &NotificationMessage) -> AppResult<NotificationResult>;

    /// Returns the provider name for logging/debugging
    fn name(&self) -> &'static str;
}
