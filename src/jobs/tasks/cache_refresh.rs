use async_trait::async_trait;

use super::JobDeps;
use crate::error::AppResult;
use crate::jobs::executor::ItemOutcome;
use crate::jobs::types::{JobBody, JobContext, JobReport, JobType};

/// Reloads issues and bills into the record cache.
///
/// Each table counts as one item.
pub struct CacheRefreshJob {
    deps: JobDeps,
}

impl CacheRefreshJob {
    pub fn new(deps: JobDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobBody for CacheRefreshJob {
    fn job_type(&self) -> JobType {
        JobType::CacheRefresh
    }

    async fn run(&self, ctx: &JobContext) -> AppResult<JobReport> {
        let tables = &self.deps.tables;
        let names = [tables.issues.clone(), tables.bills.clone()];
        ctx.progress.add_total(names.len());

        let mut report = JobReport::default();
        for table in &names {
            ctx.check_cancelled()?;
            match self.deps.records.list_records(table, tables.max_records).await {
                Ok(records) => {
                    report = report.with_summary(table, records.len());
                    self.deps.cache.put(table, records, self.deps.clock.now()).await;
                    ctx.progress.record(ItemOutcome::Updated);
                }
                Err(e) => {
                    ctx.progress.record_failure();
                    report.errors.push(format!("{}: {}", table, e));
                }
            }
        }

        if report.errors.len() == names.len() {
            return Err(crate::error::AppError::external(
                self.deps.records.name(),
                report.errors.join("; "),
            ));
        }
        Ok(report)
    }
}
