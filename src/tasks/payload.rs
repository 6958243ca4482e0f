//! Typed task payloads.
//!
//! Each [`TaskKind`] has exactly one payload struct. [`TaskPayload`] is the
//! tagged union stored on a task; [`PayloadVariant`] lets a processor declare
//! which struct it consumes, so the registry pairs payloads with processors
//! by type rather than by string.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::services::notifications::NotificationLevel;
use crate::tasks::types::TaskKind;

/// Recompute issue -> bill links for the given issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RelationshipUpdatePayload {
    #[validate(length(min = 1, max = 500, message = "issue_ids must contain 1 to 500 ids"))]
    pub issue_ids: Vec<String>,
}

/// Score bill completeness. An empty `bill_ids` list means every bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct QualityAssessmentPayload {
    #[serde(default)]
    #[validate(length(max = 500, message = "bill_ids must contain at most 500 ids"))]
    pub bill_ids: Vec<String>,
    #[serde(default = "default_min_score")]
    #[validate(range(min = 0.0, max = 100.0, message = "min_score must be between 0 and 100"))]
    pub min_score: f64,
}

fn default_min_score() -> f64 {
    60.0
}

/// Reload tables into the record cache. Empty means issues and bills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, Default)]
pub struct CacheRefreshPayload {
    #[serde(default)]
    pub tables: Vec<String>,
}

/// Normalise text fields of specific records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DataCleanupPayload {
    #[validate(length(min = 1, max = 100, message = "table must be 1 to 100 characters"))]
    pub table: String,
    #[validate(length(min = 1, max = 500, message = "record_ids must contain 1 to 500 ids"))]
    pub record_ids: Vec<String>,
}

/// Push a message to the configured notification sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NotificationPayload {
    #[validate(length(min = 1, max = 256, message = "title must be 1 to 256 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 4000, message = "message must be 1 to 4000 characters"))]
    pub message: String,
    #[serde(default)]
    pub level: NotificationLevel,
}

/// Payload stored on a task, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskPayload {
    RelationshipUpdate(RelationshipUpdatePayload),
    QualityAssessment(QualityAssessmentPayload),
    CacheRefresh(CacheRefreshPayload),
    DataCleanup(DataCleanupPayload),
    Notification(NotificationPayload),
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::RelationshipUpdate(_) => TaskKind::RelationshipUpdate,
            TaskPayload::QualityAssessment(_) => TaskKind::QualityAssessment,
            TaskPayload::CacheRefresh(_) => TaskKind::CacheRefresh,
            TaskPayload::DataCleanup(_) => TaskKind::DataCleanup,
            TaskPayload::Notification(_) => TaskKind::Notification,
        }
    }

    /// Runs the `validator` rules of the inner payload
    pub fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            TaskPayload::RelationshipUpdate(p) => p.validate(),
            TaskPayload::QualityAssessment(p) => p.validate(),
            TaskPayload::CacheRefresh(p) => p.validate(),
            TaskPayload::DataCleanup(p) => p.validate(),
            TaskPayload::Notification(p) => p.validate(),
        }
    }
}

/// Links a payload struct to its [`TaskKind`] tag.
pub trait PayloadVariant: Send + Sync + Sized + 'static {
    const KIND: TaskKind;

    fn from_payload(payload: &TaskPayload) -> Option<&Self>;

    fn into_payload(self) -> TaskPayload;
}

macro_rules! payload_variant {
    ($ty:ty, $variant:ident) => {
        impl PayloadVariant for $ty {
            const KIND: TaskKind = TaskKind::$variant;

            fn from_payload(payload: &TaskPayload) -> Option<&Self> {
                match payload {
                    TaskPayload::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_payload(self) -> TaskPayload {
                TaskPayload::$variant(self)
            }
        }

        impl From<$ty> for TaskPayload {
            fn from(value: $ty) -> Self {
                value.into_payload()
            }
        }
    };
}

payload_variant!(RelationshipUpdatePayload, RelationshipUpdate);
payload_variant!(QualityAssessmentPayload, QualityAssessment);
payload_variant!(CacheRefreshPayload, CacheRefresh);
payload_variant!(DataCleanupPayload, DataCleanup);
payload_variant!(NotificationPayload, Notification);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_kind_matches_variant() {
        let payload: TaskPayload = CacheRefreshPayload::default().into();
        assert_eq!(payload.kind(), TaskKind::CacheRefresh);
        assert!(CacheRefreshPayload::from_payload(&payload).is_some());
        assert!(DataCleanupPayload::from_payload(&payload).is_none());
    }

    #[test]
    fn test_payload_wire_format() {
        let payload: TaskPayload = serde_json::from_value(json!({
            "type": "relationship_update",
            "data": { "issue_ids": ["rec1", "rec2"] }
        }))
        .unwrap();
        assert_eq!(
            payload,
            TaskPayload::RelationshipUpdate(RelationshipUpdatePayload {
                issue_ids: vec!["rec1".to_string(), "rec2".to_string()],
            })
        );
    }

    #[test]
    fn test_quality_payload_defaults() {
        let payload: TaskPayload = serde_json::from_value(json!({
            "type": "quality_assessment",
            "data": {}
        }))
        .unwrap();
        match payload {
            TaskPayload::QualityAssessment(p) => {
                assert!(p.bill_ids.is_empty());
                assert_eq!(p.min_score, 60.0);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_payload_validation() {
        let payload: TaskPayload = RelationshipUpdatePayload { issue_ids: vec![] }.into();
        assert!(payload.validate().is_err());

        let payload: TaskPayload = NotificationPayload {
            title: "Batch".to_string(),
            message: "done".to_string(),
            level: NotificationLevel::Info,
        }
        .into();
        assert!(payload.validate().is_ok());
    }
}
