//! Clients for services outside the process.

pub mod airtable;
pub mod client;
pub mod memory;
pub mod records;

pub use airtable::AirtableClient;
pub use memory::MemoryRecordStore;
pub use records::{FieldMap, Record, RecordStore, TableNames};
