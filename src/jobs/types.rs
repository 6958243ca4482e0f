use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::jobs::executor::JobProgress;
use crate::jobs::models::BatchJobConfig;

/// Kind of work a scheduled job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    RelationshipUpdate,
    QualityAssessment,
    CacheRefresh,
    DataCleanup,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::RelationshipUpdate,
        JobType::QualityAssessment,
        JobType::CacheRefresh,
        JobType::DataCleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::RelationshipUpdate => "relationship_update",
            JobType::QualityAssessment => "quality_assessment",
            JobType::CacheRefresh => "cache_refresh",
            JobType::DataCleanup => "data_cleanup",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::validation("job_type", format!("Unknown job type '{}'", s)))
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What started an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
        }
    }
}

/// Job execution context passed to job bodies
#[derive(Clone)]
pub struct JobContext {
    pub execution_id: String,
    pub config: BatchJobConfig,
    pub trigger: Trigger,
    pub cancellation_token: CancellationToken,
    pub progress: Arc<JobProgress>,
}

impl JobContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn check_cancelled(&self) -> AppResult<()> {
        if self.is_cancelled() {
            return Err(AppError::cancelled(format!(
                "execution {} cancelled",
                self.execution_id
            )));
        }
        Ok(())
    }
}

/// What a job body hands back on success
#[derive(Debug, Clone, Default)]
pub struct JobReport {
    pub summary: Map<String, JsonValue>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl JobReport {
    pub fn with_summary(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.summary.insert(key.to_string(), value.into());
        self
    }
}

/// The work behind one [`JobType`]
#[async_trait]
pub trait JobBody: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Run the job once. Item failures belong in the report; an `Err`
    /// fails the whole execution.
    async fn run(&self, ctx: &JobContext) -> AppResult<JobReport>;
}
