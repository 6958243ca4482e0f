//! Bodies of the built-in scheduled jobs.

mod cache_refresh;
mod data_cleanup;
mod quality_assessment;
mod relationship_update;

use std::sync::Arc;

pub use cache_refresh::CacheRefreshJob;
pub use data_cleanup::DataCleanupJob;
pub use quality_assessment::QualityAssessmentJob;
pub use relationship_update::RelationshipUpdateJob;

use crate::cache::RecordCache;
use crate::clock::SharedClock;
use crate::external::records::{RecordStore, TableNames};
use crate::jobs::registry::JobRegistry;
use crate::tasks::BatchProcessor;

/// Collaborators of the job bodies
#[derive(Clone)]
pub struct JobDeps {
    pub records: Arc<dyn RecordStore>,
    pub cache: RecordCache,
    pub tables: TableNames,
    pub clock: SharedClock,
    /// Task queue whose finished tasks the cleanup job purges
    pub processor: Option<BatchProcessor>,
    pub task_retention_hours: u64,
}

pub fn default_registry(deps: &JobDeps) -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry
        .register(RelationshipUpdateJob::new(deps.clone()))
        .register(QualityAssessmentJob::new(deps.clone()))
        .register(CacheRefreshJob::new(deps.clone()))
        .register(DataCleanupJob::new(deps.clone()));
    registry
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use crate::external::MemoryRecordStore;
    use crate::jobs::executor::JobProgress;
    use crate::jobs::models::default_jobs;
    use crate::jobs::types::{JobContext, JobType, Trigger};
    use tokio_util::sync::CancellationToken;

    pub fn deps(store: Arc<MemoryRecordStore>) -> JobDeps {
        JobDeps {
            records: store,
            cache: RecordCache::new(),
            tables: TableNames::default(),
            clock: Arc::new(ManualClock::new("2026-03-10T02:00:00Z".parse().unwrap())),
            processor: None,
            task_retention_hours: 24,
        }
    }

    pub fn ctx(job_type: JobType) -> JobContext {
        let config = default_jobs("Asia/Tokyo")
            .into_iter()
            .find(|c| c.job_type == job_type)
            .unwrap();
        JobContext {
            execution_id: format!("{}_20260310_020000", config.job_id),
            config,
            trigger: Trigger::Manual,
            cancellation_token: CancellationToken::new(),
            progress: Arc::new(JobProgress::default()),
        }
    }
}
