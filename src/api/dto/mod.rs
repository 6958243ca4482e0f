//! Data Transfer Objects for API requests and responses.
//!
//! - `batch` - scheduled job endpoints
//! - `task` - task queue endpoints
//! - `health` - health check
//! - `error` - common error response

mod batch;
mod error;
mod health;
mod task;

pub use batch::{
    CancelJobResponse, JobStatusResponse, SchedulerStateResponse, TriggerJobRequest,
    TriggerJobResponse,
};
pub use error::ErrorResponse;
pub use health::{ComponentHealth, HealthResponse, HealthStatus};
pub use task::{
    CancelTaskResponse, CleanupTasksRequest, CleanupTasksResponse, CreateTaskRequest,
    CreateTaskResponse,
};
