use std::sync::Arc;

use async_trait::async_trait;

use super::JobDeps;
use crate::domain::cleanup_patch;
use crate::domain::fields::issue;
use crate::error::AppResult;
use crate::jobs::executor::{ItemOutcome, run_in_batches};
use crate::jobs::types::{JobBody, JobContext, JobReport, JobType};

/// Normalises issue text and purges old finished tasks
pub struct DataCleanupJob {
    deps: JobDeps,
}

impl DataCleanupJob {
    pub fn new(deps: JobDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobBody for DataCleanupJob {
    fn job_type(&self) -> JobType {
        JobType::DataCleanup
    }

    async fn run(&self, ctx: &JobContext) -> AppResult<JobReport> {
        let tables = &self.deps.tables;
        let issues = self
            .deps
            .records
            .list_records(&tables.issues, tables.max_records)
            .await?;
        ctx.check_cancelled()?;

        let issue_count = issues.len();
        let records = Arc::clone(&self.deps.records);
        let table = tables.issues.clone();
        let errors = run_in_batches(ctx, issues, move |record| {
            let records = Arc::clone(&records);
            let table = table.clone();
            async move {
                match cleanup_patch(&record, Some(&issue::TEXT_FIELDS)) {
                    Some(patch) => {
                        records.update_record(&table, &record.id, patch).await?;
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

        let purged_tasks = match &self.deps.processor {
            Some(processor) => {
                processor
                    .cleanup_completed_tasks(self.deps.task_retention_hours)
                    .await
            }
            None => 0,
        };

        Ok(JobReport {
            errors,
            ..JobReport::default()
        }
        .with_summary("issues", issue_count)
        .with_summary("normalised", progress.successful_items)
        .with_summary("purged_tasks", purged_tasks))
    }
}
