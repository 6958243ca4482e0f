//! Task model and the batch processor that runs tasks.

pub mod model;
pub mod payload;
pub mod processor;
pub mod processors;
pub mod queue;
pub mod registry;
pub mod store;
pub mod types;


pub use model::{BatchTask, NewTask};
pub use payload::{
    CacheRefreshPayload, DataCleanupPayload, NotificationPayload, PayloadVariant,
    QualityAssessmentPayload, RelationshipUpdatePayload, TaskPayload,
};
pub use processor::{BatchProcessor, ProcessorStats};
pub use registry::{ProcessorRegistry, TaskProcessor};
pub use types::{TaskContext, TaskKind, TaskPriority, TaskStatus};
