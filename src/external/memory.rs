use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::external::records::{FieldMap, Record, RecordStore};

/// Record store held in memory.
///
/// Backs `serve --dry-run` and the tests; writes never leave the process.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    updates: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: &str, records: Vec<Record>) -> Self {
        self.insert(table, records);
        self
    }

    /// Append records to `table`, creating it if needed
    pub fn insert(&self, table: &str, records: Vec<Record>) {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.entry(table.to_string()).or_default().extend(records);
    }

    pub fn records(&self, table: &str) -> Vec<Record> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.get(table).cloned().unwrap_or_default()
    }

    /// Number of successful `update_record` calls
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_records(&self, table: &str, max_records: usize) -> AppResult<Vec<Record>> {
        let mut records = self.records(table);
        records.truncate(max_records);
        Ok(records)
    }

    async fn get_record(&self, table: &str, record_id: &str) -> AppResult<Record> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(table)
            .and_then(|records| records.iter().find(|r| r.id == record_id))
            .cloned()
            .ok_or_else(|| AppError::not_found(table, "id", record_id))
    }

    async fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: FieldMap,
    ) -> AppResult<Record> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let record = tables
            .get_mut(table)
            .and_then(|records| records.iter_mut().find(|r| r.id == record_id))
            .ok_or_else(|| AppError::not_found(table, "id", record_id))?;
        record.fields.extend(fields);
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(record.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
