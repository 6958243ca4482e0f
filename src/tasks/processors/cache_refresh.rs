use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::ProcessorDeps;
use crate::error::AppResult;
use crate::tasks::payload::CacheRefreshPayload;
use crate::tasks::registry::TaskProcessor;
use crate::tasks::types::TaskContext;

/// Refetches tables into the record cache
pub struct CacheRefreshProcessor {
    deps: ProcessorDeps,
}

impl CacheRefreshProcessor {
    pub fn new(deps: ProcessorDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TaskProcessor for CacheRefreshProcessor {
    type Payload = CacheRefreshPayload;

    async fn process(&self, payload: &CacheRefreshPayload, ctx: &TaskContext) -> AppResult<Value> {
        let tables = if payload.tables.is_empty() {
            vec![self.deps.tables.issues.clone(), self.deps.tables.bills.clone()]
        } else {
            payload.tables.clone()
        };

        let mut counts = Map::new();
        for table in &tables {
            ctx.check_cancelled()?;
            let records = self
                .deps
                .records
                .list_records(table, self.deps.tables.max_records)
                .await?;
            counts.insert(table.clone(), json!(records.len()));
            self.deps.cache.put(table, records, self.deps.clock.now()).await;
        }

        Ok(json!({ "tables": counts }))
    }

    fn name(&self) -> &'static str {
        "cache_refresh"
    }
}
