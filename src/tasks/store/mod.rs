//! Best-effort persistence of task snapshots.
//!
//! The processor writes every state change through a [`TaskStore`] and
//! replays the stored snapshots on startup. Store failures never fail a
//! task; the processor logs them and moves on.

mod file;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::settings::{PersistenceBackend, PersistenceConfig};
use crate::tasks::model::BatchTask;

pub use self::file::FileTaskStore;
pub use self::redis::RedisTaskStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store IO failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store operation failed: {0}")]
    Operation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Snapshot storage keyed by task id
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or replace the snapshot of `task`
    async fn save(&self, task: &BatchTask) -> Result<(), StoreError>;

    /// Every stored snapshot, in no particular order
    async fn load_all(&self) -> Result<Vec<BatchTask>, StoreError>;

    async fn remove(&self, task_id: &str) -> Result<(), StoreError>;

    fn name(&self) -> &'static str;
}

/// Store used when persistence is disabled
#[derive(Debug, Default)]
pub struct NoopTaskStore;

#[async_trait]
impl TaskStore for NoopTaskStore {
    async fn save(&self, _task: &BatchTask) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<BatchTask>, StoreError> {
        Ok(Vec::new())
    }

    async fn remove(&self, _task_id: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Build the store selected by `persistence.backend`
pub async fn build_store(config: &PersistenceConfig) -> Result<Arc<dyn TaskStore>, StoreError> {
    let store: Arc<dyn TaskStore> = match config.backend {
        PersistenceBackend::None => Arc::new(NoopTaskStore),
        PersistenceBackend::File => Arc::new(FileTaskStore::new(&config.directory).await?),
        PersistenceBackend::Redis => Arc::new(RedisTaskStore::new(&config.redis).await?),
    };
    tracing::info!(backend = store.name(), "Task store initialized");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_store_is_empty() {
        let store = build_store(&PersistenceConfig::default()).await.unwrap();
        assert_eq!(store.name(), "none");
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_file_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = PersistenceConfig {
            backend: PersistenceBackend::File,
            directory: dir.path().join("tasks").to_string_lossy().into_owned(),
            ..PersistenceConfig::default()
        };
        let store = build_store(&config).await.unwrap();
        assert_eq!(store.name(), "file");
        assert!(dir.path().join("tasks").is_dir());
    }
}
