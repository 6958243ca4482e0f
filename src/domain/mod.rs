//! Rules applied to Diet Issue Tracker records by the batch work.

pub mod cleanup;
pub mod fields;
pub mod quality;
pub mod relationships;

pub use cleanup::{cleanup_patch, normalize_text};
pub use quality::{BillAssessment, assess_bill};
pub use relationships::{related_bill_ids, relationship_patch};
