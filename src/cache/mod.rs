//! In-process snapshot of Airtable tables.
//!
//! Filled by the `cache_refresh` job and task; read by the API and by
//! anything that can live with data as old as the last refresh.

use std::collections::HashMap;
use std::sync::Arc;

use jiff::Timestamp;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::external::records::Record;

#[derive(Debug, Clone)]
struct CachedTable {
    records: Arc<Vec<Record>>,
    refreshed_at: Timestamp,
}

/// Summary of one cached table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedTableInfo {
    pub table: String,
    pub record_count: usize,
    pub refreshed_at: Timestamp,
}

/// Cheap to clone; clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct RecordCache {
    tables: Arc<RwLock<HashMap<String, CachedTable>>>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot of `table`
    pub async fn put(&self, table: &str, records: Vec<Record>, refreshed_at: Timestamp) {
        let count = records.len();
        self.tables.write().await.insert(
            table.to_string(),
            CachedTable {
                records: Arc::new(records),
                refreshed_at,
            },
        );
        tracing::debug!(table, count, "Record cache refreshed");
    }

    pub async fn get(&self, table: &str) -> Option<Arc<Vec<Record>>> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| Arc::clone(&t.records))
    }

    pub async fn invalidate(&self, table: &str) -> bool {
        self.tables.write().await.remove(table).is_some()
    }

    pub async fn clear(&self) {
        self.tables.write().await.clear();
    }

    /// Cached tables sorted by name
    pub async fn tables(&self) -> Vec<CachedTableInfo> {
        let tables = self.tables.read().await;
        let mut info: Vec<CachedTableInfo> = tables
            .iter()
            .map(|(name, t)| CachedTableInfo {
                table: name.clone(),
                record_count: t.records.len(),
                refreshed_at: t.refreshed_at,
            })
            .collect();
        info.sort_by(|a, b| a.table.cmp(&b.table));
        info
    }
}
