//! Configuration settings structures for diet-batch
//!
//! This module defines all configuration structures that can be loaded from
//! TOML files and environment variables.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;
use crate::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig};

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "diet-batch".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/diet-batch.log".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application basic information configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Application version
    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// Axum HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl ServerConfig {
    /// Get the full server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
        }
    }
}

// ============================================================================
// Logger Settings
// ============================================================================

/// Console output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    /// Whether console output is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether to use colored output
    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            colored: default_true(),
        }
    }
}

/// File output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    /// Whether file output is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Path to the log file
    #[serde(default = "default_log_path")]
    pub path: String,

    /// Whether to append to existing file
    #[serde(default = "default_true")]
    pub append: bool,

    /// Log format: "full", "compact", or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: default_true(),
            format: default_log_format(),
        }
    }
}

/// Logger configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level or filter directive, e.g. "info" or "diet_batch=debug"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console output settings
    #[serde(default)]
    pub console: ConsoleSettings,

    /// File output settings
    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

impl LoggerSettings {
    /// Convert the file representation into the runtime LoggerConfig
    pub fn into_logger_config(self) -> Result<LoggerConfig, ConfigError> {
        let console = ConsoleConfig::new(self.console.enabled, self.console.colored);
        let file = self.file.into_file_config()?;

        LoggerConfig::new(console, file, self.level).map_err(|e| ConfigError::ValidationError {
            field: "logger".to_string(),
            message: e.to_string(),
        })
    }
}

impl FileSettings {
    /// Convert FileSettings to FileConfig
    pub fn into_file_config(self) -> Result<FileConfig, ConfigError> {
        let format = self
            .format
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: e.to_string(),
            })?;

        FileConfig::new(self.enabled, PathBuf::from(self.path), self.append, format).map_err(|e| {
            ConfigError::ValidationError {
                field: "logger.file".to_string(),
                message: e.to_string(),
            }
        })
    }
}

// ============================================================================
// Batch Processor Configuration
// ============================================================================

fn default_batch_size() -> usize {
    10
}

fn default_max_concurrent_tasks() -> usize {
    5
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_processing_interval_ms() -> u64 {
    1000
}

fn default_task_retry_delay() -> u64 {
    5
}

fn default_task_timeout() -> u64 {
    300
}

fn default_task_max_retries() -> u32 {
    3
}

fn default_shutdown_grace() -> u64 {
    5
}

/// Task queue and execution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Maximum number of tasks drained per processing cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of tasks executing at the same time
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Maximum number of queued tasks across all priorities
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Interval between processing cycles in milliseconds
    #[serde(default = "default_processing_interval_ms")]
    pub processing_interval_ms: u64,

    /// Flat delay between attempts in seconds
    #[serde(default = "default_task_retry_delay")]
    pub retry_delay_seconds: u64,

    /// Per-attempt timeout used when a task does not set one
    #[serde(default = "default_task_timeout")]
    pub default_timeout_seconds: u64,

    /// Attempt budget used when a task does not set one
    #[serde(default = "default_task_max_retries")]
    pub default_max_retries: u32,

    /// How long stop waits for in-flight tasks before cancelling them
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            max_queue_size: default_max_queue_size(),
            processing_interval_ms: default_processing_interval_ms(),
            retry_delay_seconds: default_task_retry_delay(),
            default_timeout_seconds: default_task_timeout(),
            default_max_retries: default_task_max_retries(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

// ============================================================================
// Persistence Configuration
// ============================================================================

fn default_persistence_directory() -> String {
    "data/tasks".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_pool_size() -> u32 {
    4
}

fn default_redis_connection_timeout() -> u64 {
    5
}

fn default_redis_key_prefix() -> String {
    "diet-batch".to_string()
}

/// Task snapshot backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    #[default]
    None,
    File,
    Redis,
}

/// Redis snapshot store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_redis_connection_timeout")]
    pub connection_timeout: u64,

    /// Key prefix for the task hash
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            connection_timeout: default_redis_connection_timeout(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}

/// Task persistence configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Backend type
    #[serde(default)]
    pub backend: PersistenceBackend,

    /// Directory for the file backend
    #[serde(default = "default_persistence_directory")]
    pub directory: String,

    /// Redis backend settings
    #[serde(default)]
    pub redis: RedisStoreConfig,

    /// Re-queue persisted tasks on startup
    #[serde(default = "default_true")]
    pub restore_on_startup: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            directory: default_persistence_directory(),
            redis: RedisStoreConfig::default(),
            restore_on_startup: default_true(),
        }
    }
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

fn default_check_interval() -> u64 {
    60
}

fn default_history_retention_days() -> u32 {
    30
}

fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}

/// Per-job override applied on top of the built-in job list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobOverride {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tasks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_on_success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_on_failure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_threshold_minutes: Option<u64>,
}

/// Scheduled job runner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the scheduling loop starts with the server
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between schedule checks
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,

    /// Execution history retention in days
    #[serde(default = "default_history_retention_days")]
    pub history_retention_days: u32,

    /// Timezone applied to jobs that do not set one
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Overrides for the built-in jobs
    #[serde(default)]
    pub jobs: Vec<JobOverride>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            check_interval_seconds: default_check_interval(),
            history_retention_days: default_history_retention_days(),
            timezone: default_timezone(),
            jobs: Vec::new(),
        }
    }
}

// ============================================================================
// Airtable Configuration
// ============================================================================

fn default_airtable_base_url() -> String {
    "https://api.airtable.com/v0".to_string()
}

fn default_request_interval_ms() -> u64 {
    200
}

fn default_max_records() -> usize {
    1000
}

fn default_airtable_timeout() -> u64 {
    30
}

fn default_issues_table() -> String {
    "Issues".to_string()
}

fn default_bills_table() -> String {
    "Bills (法案)".to_string()
}

/// Airtable record store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirtableConfig {
    /// API root, overridable for tests
    #[serde(default = "default_airtable_base_url")]
    pub base_url: String,

    /// Base identifier (`app...`). Empty selects the in-memory store.
    #[serde(default)]
    pub base_id: String,

    /// Personal access token
    #[serde(default)]
    pub api_key: String,

    /// Minimum spacing between requests in milliseconds
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Upper bound on records fetched per table by a job
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Request timeout in seconds
    #[serde(default = "default_airtable_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_issues_table")]
    pub issues_table: String,

    #[serde(default = "default_bills_table")]
    pub bills_table: String,
}

impl AirtableConfig {
    /// Whether a real Airtable base is configured
    pub fn is_configured(&self) -> bool {
        !self.base_id.is_empty() && !self.api_key.is_empty()
    }
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            base_url: default_airtable_base_url(),
            base_id: String::new(),
            api_key: String::new(),
            request_interval_ms: default_request_interval_ms(),
            max_records: default_max_records(),
            timeout_seconds: default_airtable_timeout(),
            issues_table: default_issues_table(),
            bills_table: default_bills_table(),
        }
    }
}

// ============================================================================
// Notifications Configuration
// ============================================================================

fn default_notification_timeout() -> u64 {
    10
}

/// Outbound notification sinks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Master switch for all providers
    #[serde(default)]
    pub enabled: bool,

    /// Discord incoming webhook URL
    #[serde(default)]
    pub discord_webhook_url: String,

    /// Generic JSON webhook URL
    #[serde(default)]
    pub webhook_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_notification_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            discord_webhook_url: String::new(),
            webhook_url: String::new(),
            timeout_seconds: default_notification_timeout(),
        }
    }
}

// ============================================================================
// Main Settings Structure
// ============================================================================

/// Complete application settings
///
/// This structure represents the entire configuration that can be loaded
/// from TOML files and environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Application information
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logger configuration
    #[serde(default)]
    pub logger: LoggerSettings,

    /// Task queue configuration
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Task persistence configuration
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Scheduled job configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Airtable configuration
    #[serde(default)]
    pub airtable: AirtableConfig,

    /// Notification configuration
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_server_config() -> impl Strategy<Value = ServerConfig> {
        (
            prop_oneof![Just("127.0.0.1".to_string()), Just("0.0.0.0".to_string())],
            1u16..=65535u16,
            1u64..=300u64,
        )
            .prop_map(|(host, port, request_timeout)| ServerConfig {
                host,
                port,
                request_timeout,
            })
    }

    fn arb_processor_config() -> impl Strategy<Value = ProcessorConfig> {
        (1usize..=100, 1usize..=50, 1usize..=10_000, 10u64..=10_000, 0u64..=600)
            .prop_map(
                |(batch_size, max_concurrent_tasks, max_queue_size, processing_interval_ms, retry_delay_seconds)| {
                    ProcessorConfig {
                        batch_size,
                        max_concurrent_tasks,
                        max_queue_size,
                        processing_interval_ms,
                        retry_delay_seconds,
                        ..ProcessorConfig::default()
                    }
                },
            )
    }

    fn arb_job_override() -> impl Strategy<Value = JobOverride> {
        (
            "[a-z_]{3,20}",
            proptest::option::of(any::<bool>()),
            proptest::option::of("([01][0-9]|2[0-3]):[0-5][0-9]"),
            proptest::option::of(1usize..=500),
        )
            .prop_map(|(job_id, enabled, schedule_time, batch_size)| JobOverride {
                job_id,
                enabled,
                schedule_time,
                batch_size,
                ..JobOverride::default()
            })
    }

    fn arb_settings() -> impl Strategy<Value = Settings> {
        (
            arb_server_config(),
            arb_processor_config(),
            prop::collection::vec(arb_job_override(), 0..3),
        )
            .prop_map(|(server, processor, jobs)| Settings {
                server,
                processor,
                scheduler: SchedulerConfig {
                    jobs,
                    ..SchedulerConfig::default()
                },
                ..Settings::default()
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_settings_round_trip_serialization(settings in arb_settings()) {
            let toml_str = toml::to_string(&settings).expect("Settings should serialize to TOML");
            let deserialized: Settings = toml::from_str(&toml_str).expect("TOML should deserialize");
            prop_assert_eq!(settings, deserialized);
        }
    }

    #[test]
    fn test_processor_config_defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_concurrent_tasks, 5);
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.processing_interval_ms, 1000);
        assert_eq!(config.shutdown_grace_seconds, 5);
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.check_interval_seconds, 60);
        assert_eq!(config.history_retention_days, 30);
        assert_eq!(config.timezone, "Asia/Tokyo");
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_airtable_is_configured() {
        let mut config = AirtableConfig::default();
        assert!(!config.is_configured());
        config.base_id = "appXXXX".to_string();
        config.api_key = "pat.secret".to_string();
        assert!(config.is_configured());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [processor]
            batch_size = 25

            [[scheduler.jobs]]
            job_id = "weekly_quality_assessment"
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.processor.batch_size, 25);
        assert_eq!(settings.processor.max_concurrent_tasks, 5);
        assert_eq!(settings.scheduler.jobs[0].enabled, Some(true));
        assert_eq!(settings.persistence.backend, PersistenceBackend::None);
    }

    #[test]
    fn test_logger_settings_into_config() {
        let config = LoggerSettings::default().into_logger_config().unwrap();
        assert_eq!(config.level, "info");
        assert!(config.console.enabled);
        assert!(!config.file.enabled);
    }
}
