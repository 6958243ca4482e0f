//! Configuration validation logic
//!
//! This module provides validation methods for all configuration structures
//! to ensure configuration values are within acceptable ranges and formats.

use crate::config::error::ConfigError;
use crate::config::settings::{
    AirtableConfig, FileSettings, JobOverride, LoggerSettings, NotificationsConfig,
    PersistenceBackend, PersistenceConfig, ProcessorConfig, SchedulerConfig, ServerConfig,
    Settings,
};
use crate::jobs::scheduler::parse_schedule_time;

/// Valid log levels
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid log formats
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

impl ServerConfig {
    /// Validate server configuration
    ///
    /// # Validation Rules
    /// - Port must be between 1 and 65535
    /// - Request timeout must be greater than 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::validation(
                "server.port",
                "Port must be between 1 and 65535. Please specify a valid port number.",
            ));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::validation(
                "server.request_timeout",
                "Request timeout must be greater than 0 seconds.",
            ));
        }

        Ok(())
    }
}

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Validate logger settings
    ///
    /// The level may be a plain level or an `EnvFilter` directive list; plain
    /// words must be one of the known levels.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.to_lowercase();
        let is_directive = level.contains('=') || level.contains(',');
        if !is_directive && !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        if !self.console.enabled && !self.file.enabled {
            return Err(ConfigError::validation(
                "logger",
                "At least one output (console or file) must be enabled.",
            ));
        }

        self.file.validate()
    }
}

impl ProcessorConfig {
    /// Validate task queue settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::validation(
                "processor.batch_size",
                "Batch size must be greater than 0.",
            ));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::validation(
                "processor.max_concurrent_tasks",
                "Max concurrent tasks must be greater than 0.",
            ));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::validation(
                "processor.max_queue_size",
                "Max queue size must be greater than 0.",
            ));
        }
        if self.processing_interval_ms == 0 {
            return Err(ConfigError::validation(
                "processor.processing_interval_ms",
                "Processing interval must be greater than 0 milliseconds.",
            ));
        }
        if self.default_timeout_seconds == 0 {
            return Err(ConfigError::validation(
                "processor.default_timeout_seconds",
                "Default task timeout must be greater than 0 seconds.",
            ));
        }
        Ok(())
    }
}

impl PersistenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            PersistenceBackend::None => Ok(()),
            PersistenceBackend::File if self.directory.trim().is_empty() => Err(
                ConfigError::validation(
                    "persistence.directory",
                    "Directory is required for the file backend.",
                ),
            ),
            PersistenceBackend::File => Ok(()),
            PersistenceBackend::Redis => {
                let url = &self.redis.url;
                if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                    return Err(ConfigError::ValidationError {
                        field: "persistence.redis.url".to_string(),
                        message: format!(
                            "Invalid Redis URL '{}'. Expected redis:// or rediss://",
                            url
                        ),
                    });
                }
                if self.redis.pool_size == 0 {
                    return Err(ConfigError::validation(
                        "persistence.redis.pool_size",
                        "Pool size must be greater than 0.",
                    ));
                }
                Ok(())
            }
        }
    }
}

impl JobOverride {
    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let field = |name: &str| format!("scheduler.jobs[{}].{}", index, name);

        if self.job_id.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: field("job_id"),
                message: "Job id is required.".to_string(),
            });
        }
        if let Some(schedule) = &self.schedule_time
            && let Err(reason) = parse_schedule_time(schedule)
        {
            return Err(ConfigError::ValidationError {
                field: field("schedule_time"),
                message: reason,
            });
        }
        if let Some(tz) = &self.timezone
            && jiff::tz::TimeZone::get(tz).is_err()
        {
            return Err(ConfigError::ValidationError {
                field: field("timezone"),
                message: format!("Unknown timezone '{}'", tz),
            });
        }
        if self.batch_size == Some(0) || self.max_concurrent_tasks == Some(0) {
            return Err(ConfigError::ValidationError {
                field: field("batch_size"),
                message: "Batch size and concurrency must be greater than 0.".to_string(),
            });
        }
        if self.timeout_minutes == Some(0) {
            return Err(ConfigError::ValidationError {
                field: field("timeout_minutes"),
                message: "Timeout must be greater than 0 minutes.".to_string(),
            });
        }
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval_seconds == 0 || self.check_interval_seconds > 60 {
            return Err(ConfigError::validation(
                "scheduler.check_interval_seconds",
                "Check interval must be between 1 and 60 seconds so no scheduled minute is missed.",
            ));
        }
        if self.history_retention_days == 0 {
            return Err(ConfigError::validation(
                "scheduler.history_retention_days",
                "History retention must be at least 1 day.",
            ));
        }
        if jiff::tz::TimeZone::get(&self.timezone).is_err() {
            return Err(ConfigError::ValidationError {
                field: "scheduler.timezone".to_string(),
                message: format!("Unknown timezone '{}'", self.timezone),
            });
        }
        for (index, job) in self.jobs.iter().enumerate() {
            job.validate(index)?;
        }
        Ok(())
    }
}

impl AirtableConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::validation(
                "airtable.base_url",
                "Base URL must start with http:// or https://.",
            ));
        }
        if self.base_id.is_empty() != self.api_key.is_empty() {
            return Err(ConfigError::validation(
                "airtable.api_key",
                "base_id and api_key must be set together.",
            ));
        }
        if self.max_records == 0 {
            return Err(ConfigError::validation(
                "airtable.max_records",
                "Max records must be greater than 0.",
            ));
        }
        Ok(())
    }
}

impl NotificationsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, url) in [
            ("notifications.discord_webhook_url", &self.discord_webhook_url),
            ("notifications.webhook_url", &self.webhook_url),
        ] {
            if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationError {
                    field: field.to_string(),
                    message: format!("Invalid URL '{}'", url),
                });
            }
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::validation(
                "notifications.timeout_seconds",
                "Timeout must be greater than 0 seconds.",
            ));
        }
        Ok(())
    }
}

impl Settings {
    /// Validate all configuration settings
    ///
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.logger.validate()?;
        self.processor.validate()?;
        self.persistence.validate()?;
        self.scheduler.validate()?;
        self.airtable.validate()?;
        self.notifications.validate()?;
        Ok(())
    }
}
