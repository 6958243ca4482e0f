use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{AppError, AppResult};
use crate::services::NotificationService;
use crate::services::notifications::NotificationMessage;
use crate::tasks::payload::NotificationPayload;
use crate::tasks::registry::TaskProcessor;
use crate::tasks::types::TaskContext;

/// Sends a message to every notification sink.
///
/// Fails the attempt when every sink rejects it, so the task is retried.
pub struct NotificationProcessor {
    notifier: NotificationService,
}

impl NotificationProcessor {
    pub fn new(notifier: NotificationService) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl TaskProcessor for NotificationProcessor {
    type Payload = NotificationPayload;

    async fn process(&self, payload: &NotificationPayload, ctx: &TaskContext) -> AppResult<Value> {
        if !self.notifier.is_enabled() {
            return Ok(json!({ "skipped": true, "deliveries": [] }));
        }

        let message = NotificationMessage::new(payload.level, &payload.title, &payload.message)
            .with_field("task_id", &ctx.task_id);
        let deliveries = self.notifier.send(&message).await;

        if deliveries.iter().all(|d| !d.result.success) {
            return Err(AppError::external(
                "notifications",
                format!("no provider accepted '{}'", payload.title),
            ));
        }

        Ok(json!({ "skipped": false, "deliveries": deliveries }))
    }

    fn name(&self) -> &'static str {
        "notification"
    }
}
