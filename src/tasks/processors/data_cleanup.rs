use async_trait::async_trait;
use serde_json::{Value, json};

use super::ProcessorDeps;
use crate::domain::cleanup_patch;
use crate::domain::fields::issue;
use crate::error::AppResult;
use crate::tasks::payload::DataCleanupPayload;
use crate::tasks::registry::TaskProcessor;
use crate::tasks::types::TaskContext;

/// Normalises whitespace in the text fields of specific records.
///
/// Issues only touch their free-text fields; other tables have every string
/// field normalised.
pub struct DataCleanupProcessor {
    deps: ProcessorDeps,
}

impl DataCleanupProcessor {
    pub fn new(deps: ProcessorDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TaskProcessor for DataCleanupProcessor {
    type Payload = DataCleanupPayload;

    async fn process(&self, payload: &DataCleanupPayload, ctx: &TaskContext) -> AppResult<Value> {
        let fields = (payload.table == self.deps.tables.issues).then_some(&issue::TEXT_FIELDS[..]);

        let mut updated = 0usize;
        for record_id in &payload.record_ids {
            ctx.check_cancelled()?;
            let record = self.deps.records.get_record(&payload.table, record_id).await?;
            if let Some(patch) = cleanup_patch(&record, fields) {
                self.deps
                    .records
                    .update_record(&payload.table, record_id, patch)
                    .await?;
                updated += 1;
            }
        }

        if updated > 0 {
            self.deps.cache.invalidate(&payload.table).await;
        }

        Ok(json!({
            "table": payload.table,
            "processed": payload.record_ids.len(),
            "updated": updated,
        }))
    }

    fn name(&self) -> &'static str {
        "data_cleanup"
    }
}
