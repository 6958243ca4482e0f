//! Request and response bodies of the `/api/tasks` endpoints.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::tasks::{NewTask, TaskPayload, TaskPriority, TaskStatus};

/// Body of `POST /api/tasks`
///
/// ```json
/// {
///   "payload": { "type": "cache_refresh", "data": { "tables": ["Issues"] } },
///   "priority": "high",
///   "depends_on": ["refresh-bills"]
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTaskRequest {
    pub payload: TaskPayload,
    #[serde(default)]
    pub priority: TaskPriority,
    #[validate(range(max = 20, message = "max_retries must be at most 20"))]
    pub max_retries: Option<u32>,
    #[validate(range(min = 1, max = 86400, message = "timeout_seconds must be between 1 and 86400"))]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    #[validate(length(max = 20, message = "at most 20 tags are allowed"))]
    pub tags: Vec<String>,
    #[serde(default)]
    #[validate(length(max = 100, message = "at most 100 dependencies are allowed"))]
    pub depends_on: Vec<String>,
    pub task_id: Option<String>,
}

impl From<CreateTaskRequest> for NewTask {
    fn from(request: CreateTaskRequest) -> Self {
        let mut task = NewTask::new(request.payload)
            .with_priority(request.priority)
            .with_tags(request.tags)
            .depends_on(request.depends_on);
        task.max_retries = request.max_retries;
        task.timeout_seconds = request.timeout_seconds;
        task.task_id = request.task_id;
        task
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelTaskResponse {
    pub task_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CleanupTasksRequest {
    #[serde(default = "default_max_age_hours")]
    #[validate(range(max = 8760, message = "max_age_hours must be at most 8760"))]
    pub max_age_hours: u64,
}

fn default_max_age_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupTasksResponse {
    pub removed: usize,
    pub max_age_hours: u64,
}
