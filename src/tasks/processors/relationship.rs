use async_trait::async_trait;
use serde_json::{Value, json};

use super::ProcessorDeps;
use crate::domain::relationship_patch;
use crate::error::AppResult;
use crate::tasks::payload::RelationshipUpdatePayload;
use crate::tasks::registry::TaskProcessor;
use crate::tasks::types::TaskContext;

/// Recomputes `Related_Bills` for the listed issues
pub struct RelationshipUpdateProcessor {
    deps: ProcessorDeps,
}

impl RelationshipUpdateProcessor {
    pub fn new(deps: ProcessorDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TaskProcessor for RelationshipUpdateProcessor {
    type Payload = RelationshipUpdatePayload;

    async fn process(&self, payload: &RelationshipUpdatePayload, ctx: &TaskContext) -> AppResult<Value> {
        let tables = &self.deps.tables;
        let bills = self.deps.load_table(&tables.bills).await?;

        let mut updated = 0usize;
        let mut unchanged = 0usize;
        for issue_id in &payload.issue_ids {
            ctx.check_cancelled()?;
            let issue = self.deps.records.get_record(&tables.issues, issue_id).await?;
            match relationship_patch(&issue, &bills) {
                Some(patch) => {
                    self.deps
                        .records
                        .update_record(&tables.issues, issue_id, patch)
                        .await?;
                    updated += 1;
                }
                None => unchanged += 1,
            }
        }

        if updated > 0 {
            self.deps.cache.invalidate(&tables.issues).await;
        }
        tracing::debug!(task_id = %ctx.task_id, updated, unchanged, "Relationships updated");

        Ok(json!({
            "processed": payload.issue_ids.len(),
            "updated": updated,
            "unchanged": unchanged,
            "bill_count": bills.len(),
        }))
    }

    fn name(&self) -> &'static str {
        "relationship_update"
    }
}
