//! Job and task notifications.
//!
//! [`NotificationService`] fans a message out to every configured
//! [`NotificationProvider`]: a Discord webhook and a generic JSON webhook.

mod discord_provider;
mod provider;
mod webhook_provider;

pub mod notification_service;

pub use discord_provider::DiscordProvider;
pub use notification_service::{Delivery, NotificationService};
pub use provider::{
    NotificationLevel, NotificationMessage, NotificationProvider, NotificationResult,
};
pub use webhook_provider::WebhookProvider;
