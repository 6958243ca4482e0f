//! Request and response bodies of the `/api/batch` endpoints.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::jobs::{BatchJobExecution, JobOverview};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TriggerJobRequest {
    /// Start even when the job already has a running execution
    #[serde(default)]
    pub force_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerJobResponse {
    pub job_id: String,
    pub execution_id: String,
    pub force_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelJobResponse {
    pub job_id: String,
    /// False when the job had no running execution
    pub cancelled: bool,
}

/// Configuration, schedule state and latest run of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    #[serde(flatten)]
    pub overview: JobOverview,
    pub latest_execution: Option<BatchJobExecution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStateResponse {
    pub running: bool,
    pub active_executions: usize,
}
