use std::sync::Arc;

use async_trait::async_trait;

use super::JobDeps;
use crate::domain::relationship_patch;
use crate::error::AppResult;
use crate::jobs::executor::{ItemOutcome, run_in_batches};
use crate::jobs::types::{JobBody, JobContext, JobReport, JobType};

/// Recomputes `Related_Bills` on every issue
pub struct RelationshipUpdateJob {
    deps: JobDeps,
}

impl RelationshipUpdateJob {
    pub fn new(deps: JobDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobBody for RelationshipUpdateJob {
    fn job_type(&self) -> JobType {
        JobType::RelationshipUpdate
    }

    async fn run(&self, ctx: &JobContext) -> AppResult<JobReport> {
        let tables = &self.deps.tables;
        let issues = self
            .deps
            .records
            .list_records(&tables.issues, tables.max_records)
            .await?;
        let bills = Arc::new(
            self.deps
                .records
                .list_records(&tables.bills, tables.max_records)
                .await?,
        );
        ctx.check_cancelled()?;

        let issue_count = issues.len();
        let bill_count = bills.len();
        let records = Arc::clone(&self.deps.records);
        let table = tables.issues.clone();
        let errors = run_in_batches(ctx, issues, move |issue| {
            let records = Arc::clone(&records);
            let bills = Arc::clone(&bills);
            let table = table.clone();
            async move {
                match relationship_patch(&issue, &bills) {
                    Some(patch) => {
                        records.update_record(&table, &issue.id, patch).await?;
                        Ok(ItemOutcome::Updated)
                    }
                    None => Ok(ItemOutcome::Unchanged),
                }
            }
        })
        .await;
        ctx.check_cancelled()?;

        let progress = ctx.progress.snapshot();
        if progress.successful_items > 0 {
            self.deps.cache.invalidate(&tables.issues).await;
        }

        Ok(JobReport {
            errors,
            ..JobReport::default()
        }
        .with_summary("issues", issue_count)
        .with_summary("bills", bill_count)
        .with_summary("updated", progress.successful_items)
        .with_summary("unchanged", progress.skipped_items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::external::MemoryRecordStore;
    use crate::jobs::tasks::test_support::{ctx, deps};
    use crate::tasks::processors::test_support::record;
    use serde_json::json;

    fn store() -> Arc<MemoryRecordStore> {
        Arc::new(
            MemoryRecordStore::new()
                .with_table(
                    "Issues",
                    vec![
                        record("recI1", json!({ "Category": ["tax"] })),
                        record("recI2", json!({ "Source": "Bill 213-7 hearing" })),
                        record("recI3", json!({ "Category": ["defense"] })),
                    ],
                )
                .with_table(
                    "Bills (法案)",
                    vec![
                        record("recB1", json!({ "Bill_Number": "213-1", "Category": ["tax"] })),
                        record("recB2", json!({ "Bill_Number": "213-7", "Category": ["welfare"] })),
                    ],
                ),
        )
    }

    #[tokio::test]
    async fn test_links_every_issue() {
        let store = store();
        let job = RelationshipUpdateJob::new(deps(store.clone()));
        let ctx = ctx(JobType::RelationshipUpdate);

        let report = job.run(&ctx).await.unwrap();
        assert_eq!(report.summary["updated"], 2);
        assert_eq!(report.summary["unchanged"], 1);
        assert!(report.errors.is_empty());

        let issues = store.records("Issues");
        assert_eq!(issues[0].list("Related_Bills"), vec!["recB1"]);
        assert_eq!(issues[1].list("Related_Bills"), vec!["recB2"]);
        assert_eq!(ctx.progress.snapshot().processed_items, 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let job = RelationshipUpdateJob::new(deps(store()));
        let ctx = ctx(JobType::RelationshipUpdate);
        ctx.cancellation_token.cancel();
        assert!(matches!(job.run(&ctx).await, Err(AppError::Cancelled { .. })));
    }
}
