//! Processors registered by the server for every task kind.

mod cache_refresh;
mod data_cleanup;
mod notification;
mod quality;
mod relationship;

use std::sync::Arc;

pub use cache_refresh::CacheRefreshProcessor;
pub use data_cleanup::DataCleanupProcessor;
pub use notification::NotificationProcessor;
pub use quality::QualityAssessmentProcessor;
pub use relationship::RelationshipUpdateProcessor;

use crate::cache::RecordCache;
use crate::clock::SharedClock;
use crate::error::AppResult;
use crate::external::records::{Record, RecordStore, TableNames};
use crate::services::NotificationService;
use crate::tasks::BatchProcessor;

/// Collaborators shared by the default processors
#[derive(Clone)]
pub struct ProcessorDeps {
    pub records: Arc<dyn RecordStore>,
    pub cache: RecordCache,
    pub notifier: NotificationService,
    pub tables: TableNames,
    pub clock: SharedClock,
}

impl ProcessorDeps {
    /// Cached snapshot of `table`, fetched and cached on a miss
    pub(crate) async fn load_table(&self, table: &str) -> AppResult<Arc<Vec<Record>>> {
        if let Some(records) = self.cache.get(table).await {
            return Ok(records);
        }
        let records = self
            .records
            .list_records(table, self.tables.max_records)
            .await?;
        self.cache.put(table, records, self.clock.now()).await;
        self.cache
            .get(table)
            .await
            .ok_or_else(|| crate::error::AppError::not_found("cache", "table", table))
    }
}

pub fn register_default_processors(processor: &BatchProcessor, deps: &ProcessorDeps) {
    processor.register_processor(RelationshipUpdateProcessor::new(deps.clone()));
    processor.register_processor(QualityAssessmentProcessor::new(deps.clone()));
    processor.register_processor(CacheRefreshProcessor::new(deps.clone()));
    processor.register_processor(DataCleanupProcessor::new(deps.clone()));
    processor.register_processor(NotificationProcessor::new(deps.notifier.clone()));
}
