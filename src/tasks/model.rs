use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tasks::payload::TaskPayload;
use crate::tasks::types::{TaskKind, TaskPriority, TaskStatus};

/// Default per-attempt budget when a caller does not set one
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
/// Default total attempt budget
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A unit of work tracked by the batch processor.
///
/// `kind` always mirrors `payload.kind()`; it is stored separately so
/// snapshots can be filtered without matching on the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTask {
    pub task_id: String,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub payload: TaskPayload,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    /// Total number of attempts allowed. Zero behaves as one.
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl BatchTask {
    pub fn has_dependencies(&self) -> bool {
        !self.depends_on.is_empty()
    }

    /// Whether another attempt is allowed after `retry_count` failures.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub(crate) fn mark_completed(&mut self, result: Value, now: Timestamp) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.error_message = None;
        self.completed_at = Some(now);
    }

    pub(crate) fn mark_failed(&mut self, message: impl Into<String>, now: Timestamp) {
        self.status = TaskStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(now);
    }

    pub(crate) fn mark_cancelled(&mut self, message: impl Into<String>, now: Timestamp) {
        self.status = TaskStatus::Cancelled;
        self.error_message = Some(message.into());
        self.completed_at = Some(now);
    }

    /// Wall-clock seconds between start and completion, if both are known
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                Some(end.duration_since(start).as_secs_f64())
            }
            _ => None,
        }
    }
}

/// Builder for a task submitted to [`BatchProcessor::add_task`].
///
/// [`BatchProcessor::add_task`]: crate::tasks::BatchProcessor::add_task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub payload: TaskPayload,
    pub priority: TaskPriority,
    pub max_retries: Option<u32>,
    pub timeout_seconds: Option<u64>,
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
    pub task_id: Option<String>,
}

impl NewTask {
    pub fn new(payload: impl Into<TaskPayload>) -> Self {
        Self {
            payload: payload.into(),
            priority: TaskPriority::default(),
            max_retries: None,
            timeout_seconds: None,
            tags: Vec::new(),
            depends_on: Vec::new(),
            task_id: None,
        }
    }

    pub fn with_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Materialises the task in `Queued` state.
    pub(crate) fn into_task(
        self,
        task_id: String,
        default_max_retries: u32,
        default_timeout_seconds: u64,
        now: Timestamp,
    ) -> BatchTask {
        BatchTask {
            task_id,
            kind: self.payload.kind(),
            priority: self.priority,
            status: TaskStatus::Queued,
            payload: self.payload,
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: self.max_retries.unwrap_or(default_max_retries),
            timeout_seconds: self.timeout_seconds.unwrap_or(default_timeout_seconds),
            tags: self.tags,
            depends_on: self.depends_on,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}
