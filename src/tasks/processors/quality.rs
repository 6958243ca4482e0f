use async_trait::async_trait;
use serde_json::{Value, json};

use super::ProcessorDeps;
use crate::domain::assess_bill;
use crate::error::AppResult;
use crate::external::records::Record;
use crate::tasks::payload::QualityAssessmentPayload;
use crate::tasks::registry::TaskProcessor;
use crate::tasks::types::TaskContext;

/// Scores bills and writes `Quality_Score` back
pub struct QualityAssessmentProcessor {
    deps: ProcessorDeps,
}

impl QualityAssessmentProcessor {
    pub fn new(deps: ProcessorDeps) -> Self {
        Self { deps }
    }

    async fn bills(&self, ids: &[String], ctx: &TaskContext) -> AppResult<Vec<Record>> {
        let table = &self.deps.tables.bills;
        if ids.is_empty() {
            return self
                .deps
                .records
                .list_records(table, self.deps.tables.max_records)
                .await;
        }
        let mut bills = Vec::with_capacity(ids.len());
        for id in ids {
            ctx.check_cancelled()?;
            bills.push(self.deps.records.get_record(table, id).await?);
        }
        Ok(bills)
    }
}

#[async_trait]
impl TaskProcessor for QualityAssessmentProcessor {
    type Payload = QualityAssessmentPayload;

    async fn process(&self, payload: &QualityAssessmentPayload, ctx: &TaskContext) -> AppResult<Value> {
        let table = &self.deps.tables.bills;
        let bills = self.bills(&payload.bill_ids, ctx).await?;

        let mut updated = 0usize;
        let mut total_score = 0.0;
        let mut below = Vec::new();
        for bill in &bills {
            ctx.check_cancelled()?;
            let assessment = assess_bill(bill);
            total_score += assessment.score;
            if assessment.is_below(payload.min_score) {
                below.push(assessment.describe());
            }
            if let Some(patch) = assessment.patch(bill) {
                self.deps.records.update_record(table, &bill.id, patch).await?;
                updated += 1;
            }
        }

        if updated > 0 {
            self.deps.cache.invalidate(table).await;
        }
        let average = if bills.is_empty() {
            0.0
        } else {
            total_score / bills.len() as f64
        };

        Ok(json!({
            "assessed": bills.len(),
            "updated": updated,
            "average_score": average,
            "below_threshold": below,
        }))
    }

    fn name(&self) -> &'static str {
        "quality_assessment"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::MemoryRecordStore;
    use crate::tasks::processors::test_support::{ctx, deps, record};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_scores_every_bill_when_no_ids() {
        let store = Arc::new(MemoryRecordStore::new().with_table(
            "Bills (法案)",
            vec![
                record(
                    "recB1",
                    json!({
                        "Bill_Name": "Budget",
                        "Bill_Number": "213-1",
                        "Diet_Session": 213,
                        "Status": "passed",
                        "Summary": "Annual budget",
                    }),
                ),
                record("recB2", json!({ "Bill_Name": "Draft" })),
            ],
        ));
        let processor = QualityAssessmentProcessor::new(deps(store.clone()));
        let payload = QualityAssessmentPayload {
            bill_ids: vec![],
            min_score: 60.0,
        };

        let result = processor.process(&payload, &ctx()).await.unwrap();
        assert_eq!(result["assessed"], 2);
        assert_eq!(result["updated"], 2);
        assert_eq!(result["average_score"], 58.0);
        assert_eq!(result["below_threshold"].as_array().unwrap().len(), 1);

        let bills = store.records("Bills (法案)");
        assert_eq!(bills[0].number("Quality_Score"), Some(100.0));
        assert_eq!(bills[1].number("Quality_Score"), Some(16.0));

        let again = processor.process(&payload, &ctx()).await.unwrap();
        assert_eq!(again["updated"], 0);
    }
}
