use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::JobDeps;
use crate::domain::assess_bill;
use crate::error::AppResult;
use crate::jobs::executor::{ItemOutcome, run_in_batches};
use crate::jobs::types::{JobBody, JobContext, JobReport, JobType};

/// Bills scoring below this get a warning in the execution record
pub const LOW_QUALITY_SCORE: f64 = 60.0;

/// Scores every bill and writes `Quality_Score`
pub struct QualityAssessmentJob {
    deps: JobDeps,
}

impl QualityAssessmentJob {
    pub fn new(deps: JobDeps) -> Self {
        Self { deps }
    }
}

#[derive(Default)]
struct Tally {
    total_score: f64,
    low_quality: Vec<String>,
}

#[async_trait]
impl JobBody for QualityAssessmentJob {
    fn job_type(&self) -> JobType {
        JobType::QualityAssessment
    }

    async fn run(&self, ctx: &JobContext) -> AppResult<JobReport> {
        let tables = &self.deps.tables;
        let bills = self
            .deps
            .records
            .list_records(&tables.bills, tables.max_records)
            .await?;
        ctx.check_cancelled()?;

        let bill_count = bills.len();
        let tally = Arc::new(Mutex::new(Tally::default()));
        let records = Arc::clone(&self.deps.records);
        let table = tables.bills.clone();
        let shared = Arc::clone(&tally);
        let errors = run_in_batches(ctx, bills, move |bill| {
            let records = Arc::clone(&records);
            let table = table.clone();
            let tally = Arc::clone(&shared);
            async move {
                let assessment = assess_bill(&bill);
                {
                    let mut tally = tally.lock().unwrap_or_else(PoisonError::into_inner);
                    tally.total_score += assessment.score;
                    if assessment.is_below(LOW_QUALITY_SCORE) {
                        tally.low_quality.push(assessment.describe());
                    }
                }
                match assessment.patch(&bill) {
                    Some(patch) => {
                        records.update_record(&table, &bill.id, patch).await?;
                        Ok(ItemOutcome::Updated)
                    }
                    None => Ok(ItemOutcome::Unchanged),
                }
            }
        })
        .await;
        ctx.check_cancelled()?;

        let tally = std::mem::take(&mut *tally.lock().unwrap_or_else(PoisonError::into_inner));
        let progress = ctx.progress.snapshot();
        if progress.successful_items > 0 {
            self.deps.cache.invalidate(&tables.bills).await;
        }
        let average = if bill_count == 0 {
            0.0
        } else {
            tally.total_score / bill_count as f64
        };

        Ok(JobReport {
            errors,
            warnings: tally.low_quality.clone(),
            ..JobReport::default()
        }
        .with_summary("bills", bill_count)
        .with_summary("updated", progress.successful_items)
        .with_summary("average_score", average)
        .with_summary("low_quality", tally.low_quality.len()))
    }
}
