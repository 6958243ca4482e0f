use jiff::Timestamp;
use jiff::tz::TimeZone;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use validator::Validate;

use crate::config::settings::JobOverride;
use crate::error::{AppError, AppResult};
use crate::jobs::executor::ProgressSnapshot;
use crate::jobs::scheduler::{ScheduleTime, parse_schedule_time};
use crate::jobs::types::{JobStatus, JobType, Trigger};

// ============================================================================
// Job configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobConfig {
    pub job_id: String,
    pub job_type: JobType,
    pub name: String,
    pub description: String,
    /// `HH:MM[:SS]` in `timezone`
    pub schedule_time: String,
    pub timezone: String,
    pub enabled: bool,
    pub batch_size: usize,
    pub max_concurrent_tasks: usize,
    pub timeout_minutes: u64,
    /// Extra attempts per item after a transient failure
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub notification_on_success: bool,
    pub notification_on_failure: bool,
    pub alert_threshold_minutes: u64,
}

impl BatchJobConfig {
    pub fn schedule(&self) -> AppResult<ScheduleTime> {
        parse_schedule_time(&self.schedule_time)
            .map_err(|reason| AppError::validation("schedule_time", reason))
    }

    pub fn time_zone(&self) -> AppResult<TimeZone> {
        TimeZone::get(&self.timezone).map_err(|_| {
            AppError::validation("timezone", format!("Unknown timezone '{}'", self.timezone))
        })
    }
}

struct JobDefaults {
    job_id: &'static str,
    job_type: JobType,
    name: &'static str,
    description: &'static str,
    schedule_time: &'static str,
    enabled: bool,
    batch_size: usize,
    max_concurrent_tasks: usize,
    timeout_minutes: u64,
    notification_on_success: bool,
    alert_threshold_minutes: u64,
}

const DEFAULT_JOBS: [JobDefaults; 4] = [
    JobDefaults {
        job_id: "daily_relationship_update",
        job_type: JobType::RelationshipUpdate,
        name: "Daily relationship update",
        description: "Recompute links between issues and bills",
        schedule_time: "02:00",
        enabled: true,
        batch_size: 50,
        max_concurrent_tasks: 5,
        timeout_minutes: 60,
        notification_on_success: false,
        alert_threshold_minutes: 45,
    },
    JobDefaults {
        job_id: "weekly_quality_assessment",
        job_type: JobType::QualityAssessment,
        name: "Quality assessment",
        description: "Score bill records for completeness",
        schedule_time: "03:00",
        enabled: false,
        batch_size: 100,
        max_concurrent_tasks: 3,
        timeout_minutes: 120,
        notification_on_success: true,
        alert_threshold_minutes: 90,
    },
    JobDefaults {
        job_id: "hourly_cache_refresh",
        job_type: JobType::CacheRefresh,
        name: "Cache refresh",
        description: "Reload issues and bills into the record cache",
        schedule_time: "04:30",
        enabled: true,
        batch_size: 200,
        max_concurrent_tasks: 10,
        timeout_minutes: 15,
        notification_on_success: false,
        alert_threshold_minutes: 10,
    },
    JobDefaults {
        job_id: "daily_data_cleanup",
        job_type: JobType::DataCleanup,
        name: "Daily data cleanup",
        description: "Normalise issue text and purge old task records",
        schedule_time: "05:00",
        enabled: true,
        batch_size: 100,
        max_concurrent_tasks: 2,
        timeout_minutes: 30,
        notification_on_success: false,
        alert_threshold_minutes: 20,
    },
];

/// The built-in jobs, all in `timezone`
pub fn default_jobs(timezone: &str) -> Vec<BatchJobConfig> {
    DEFAULT_JOBS
        .iter()
        .map(|d| BatchJobConfig {
            job_id: d.job_id.to_string(),
            job_type: d.job_type,
            name: d.name.to_string(),
            description: d.description.to_string(),
            schedule_time: d.schedule_time.to_string(),
            timezone: timezone.to_string(),
            enabled: d.enabled,
            batch_size: d.batch_size,
            max_concurrent_tasks: d.max_concurrent_tasks,
            timeout_minutes: d.timeout_minutes,
            retry_attempts: 3,
            retry_delay_seconds: 5,
            notification_on_success: d.notification_on_success,
            notification_on_failure: true,
            alert_threshold_minutes: d.alert_threshold_minutes,
        })
        .collect()
}

/// Partial update of a [`BatchJobConfig`]; unset fields stay as they are
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct JobConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200, message = "name must be 1 to 200 characters"))]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000, message = "description must be at most 1000 characters"))]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 1000, message = "batch_size must be between 1 and 1000"))]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 50, message = "max_concurrent_tasks must be between 1 and 50"))]
    pub max_concurrent_tasks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 1440, message = "timeout_minutes must be between 1 and 1440"))]
    pub timeout_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(max = 10, message = "retry_attempts must be at most 10"))]
    pub retry_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(max = 3600, message = "retry_delay_seconds must be at most 3600"))]
    pub retry_delay_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_on_success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_on_failure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 1440, message = "alert_threshold_minutes must be between 1 and 1440"))]
    pub alert_threshold_minutes: Option<u64>,
}

impl JobConfigUpdate {
    /// Field rules plus schedule and timezone parsing
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;
        if let Some(schedule) = &self.schedule_time {
            parse_schedule_time(schedule)
                .map_err(|reason| AppError::validation("schedule_time", reason))?;
        }
        if let Some(tz) = &self.timezone
            && TimeZone::get(tz).is_err()
        {
            return Err(AppError::validation(
                "timezone",
                format!("Unknown timezone '{}'", tz),
            ));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, config: &mut BatchJobConfig) {
        macro_rules! set {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = &self.$field {
                    config.$field = value.clone();
                })*
            };
        }
        set!(
            name,
            description,
            schedule_time,
            timezone,
            enabled,
            batch_size,
            max_concurrent_tasks,
            timeout_minutes,
            retry_attempts,
            retry_delay_seconds,
            notification_on_success,
            notification_on_failure,
            alert_threshold_minutes,
        );
    }
}

impl From<&JobOverride> for JobConfigUpdate {
    fn from(o: &JobOverride) -> Self {
        Self {
            name: None,
            description: None,
            schedule_time: o.schedule_time.clone(),
            timezone: o.timezone.clone(),
            enabled: o.enabled,
            batch_size: o.batch_size,
            max_concurrent_tasks: o.max_concurrent_tasks,
            timeout_minutes: o.timeout_minutes,
            retry_attempts: o.retry_attempts,
            retry_delay_seconds: o.retry_delay_seconds,
            notification_on_success: o.notification_on_success,
            notification_on_failure: o.notification_on_failure,
            alert_threshold_minutes: o.alert_threshold_minutes,
        }
    }
}

// ============================================================================
// Job execution
// ============================================================================

/// One run of a job, live while active and frozen once in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobExecution {
    pub execution_id: String,
    pub job_id: String,
    pub job_config: BatchJobConfig,
    pub status: JobStatus,
    pub trigger: Trigger,
    pub total_items: usize,
    pub processed_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub skipped_items: usize,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub duration_seconds: Option<f64>,
    pub items_per_second: f64,
    pub result_summary: Map<String, JsonValue>,
    pub error_messages: Vec<String>,
    pub warnings: Vec<String>,
}

impl BatchJobExecution {
    /// A new execution, `Pending` until its body starts
    pub fn pending(
        execution_id: String,
        job_config: BatchJobConfig,
        trigger: Trigger,
        now: Timestamp,
    ) -> Self {
        Self {
            execution_id,
            job_id: job_config.job_id.clone(),
            job_config,
            status: JobStatus::Pending,
            trigger,
            total_items: 0,
            processed_items: 0,
            successful_items: 0,
            failed_items: 0,
            skipped_items: 0,
            started_at: now,
            completed_at: None,
            duration_seconds: None,
            items_per_second: 0.0,
            result_summary: Map::new(),
            error_messages: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn mark_running(&mut self) {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Running;
        }
    }

    pub fn apply_progress(&mut self, progress: ProgressSnapshot) {
        self.total_items = progress.total_items;
        self.processed_items = progress.processed_items;
        self.successful_items = progress.successful_items;
        self.failed_items = progress.failed_items;
        self.skipped_items = progress.skipped_items;
    }

    /// Freeze the execution in a terminal `status`
    pub fn finish(&mut self, status: JobStatus, completed_at: Timestamp, duration_seconds: f64) {
        self.status = status;
        self.completed_at = Some(completed_at);
        self.duration_seconds = Some(duration_seconds);
        self.items_per_second = if duration_seconds > 0.0 {
            self.processed_items as f64 / duration_seconds
        } else {
            0.0
        };
    }
}
