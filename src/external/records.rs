//! Record model and the storage seam used by jobs and processors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::settings::AirtableConfig;
use crate::error::AppResult;

/// Field name to value, as stored by Airtable
pub type FieldMap = Map<String, Value>;

/// One row of an Airtable table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            id: id.into(),
            fields,
            created_time: None,
        }
    }

    /// Text value of a field, if present and a string
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Non-blank text value of a field
    pub fn non_blank(&self, field: &str) -> Option<&str> {
        self.text(field).map(str::trim).filter(|s| !s.is_empty())
    }

    /// String list value of a field (linked records, multi-selects).
    ///
    /// A plain string is treated as a one-element list.
    pub fn list(&self, field: &str) -> Vec<String> {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }
}

/// Table names and fetch bound shared by jobs and processors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub issues: String,
    pub bills: String,
    pub max_records: usize,
}

impl From<&AirtableConfig> for TableNames {
    fn from(config: &AirtableConfig) -> Self {
        Self {
            issues: config.issues_table.clone(),
            bills: config.bills_table.clone(),
            max_records: config.max_records,
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::from(&AirtableConfig::default())
    }
}

/// Table storage the batch work reads from and writes to
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Up to `max_records` records of `table`, following pagination.
    async fn list_records(&self, table: &str, max_records: usize) -> AppResult<Vec<Record>>;

    /// A single record. `NotFound` when it does not exist.
    async fn get_record(&self, table: &str, record_id: &str) -> AppResult<Record>;

    /// Patch the given fields; other fields are left untouched.
    async fn update_record(&self, table: &str, record_id: &str, fields: FieldMap)
    -> AppResult<Record>;

    fn name(&self) -> &'static str;
}
