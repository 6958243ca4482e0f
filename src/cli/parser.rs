//! CLI argument parsing with clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use reqwest::Url;
use std::path::PathBuf;

use crate::build;

/// Batch processing service for the Diet Issue Tracker
#[derive(Parser, Debug)]
#[command(name = "diet-batch")]
#[command(about = "Batch processing service for the Diet Issue Tracker")]
#[command(long_about = "
diet-batch runs the background work of the Diet Issue Tracker: a prioritised
task queue and a set of daily scheduled jobs (relationship updates, quality
assessment, cache refresh and data cleanup) over the Airtable base.

The serve command starts the service. The other commands talk to the HTTP
API of a running instance.

EXAMPLES:
    # Start the service with the layered configuration in ./config
    diet-batch serve

    # Check configuration without starting anything
    diet-batch --env production serve --dry-run

    # Show every job, or one job in detail
    diet-batch status
    diet-batch status daily_relationship_update

    # Run a job now, even if it is already running
    diet-batch trigger daily_data_cleanup --force

    # Move a job and enable it
    diet-batch config weekly_quality_assessment --enable --schedule-time 03:30

    # Pause the scheduler of a remote instance
    diet-batch --api-url http://batch.internal:8080 scheduler stop
")]
#[command(version = build::CLAP_LONG_VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Read only this TOML file instead of the layered files in ./config.
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection (DIET_APP_ENV)
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Base URL of a running instance, used by the monitoring commands
    #[arg(
        long,
        global = true,
        env = "DIET_API_URL",
        value_name = "URL",
        default_value = "http://127.0.0.1:8080",
        value_parser = super::validation::validate_api_url
    )]
    pub api_url: Url,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the service (default)
    ///
    /// Examples:
    ///   diet-batch serve
    ///   diet-batch serve --host 0.0.0.0 --port 8080
    ///   diet-batch serve --dry-run
    Serve {
        /// Host address to bind to
        #[arg(long, value_name = "ADDRESS", value_parser = super::validation::validate_host_address)]
        host: Option<String>,

        /// Port number to listen on
        #[arg(short, long, value_name = "PORT", value_parser = super::validation::validate_port)]
        port: Option<u16>,

        /// Log level override; wins over --verbose and --quiet
        #[arg(long, value_enum)]
        log_level: Option<LogLevel>,

        /// Validate configuration and exit
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the state of every job, or of one job
    Status {
        /// Job to show in detail
        job_id: Option<String>,
    },

    /// Run a job now, outside its schedule
    Trigger {
        job_id: String,

        /// Start even if the job is already running
        #[arg(long)]
        force: bool,
    },

    /// Cancel the running execution of a job
    Cancel { job_id: String },

    /// Show or change the configuration of a job
    ///
    /// Without any change flag the current configuration is printed.
    Config(ConfigArgs),

    /// Control the scheduling loop of a running instance
    Scheduler {
        #[arg(value_enum)]
        action: SchedulerAction,
    },
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ConfigArgs {
    pub job_id: String,

    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    #[arg(long)]
    pub disable: bool,

    /// Local time of day, HH:MM or HH:MM:SS
    #[arg(long, value_name = "TIME", value_parser = super::validation::validate_schedule_time)]
    pub schedule_time: Option<String>,

    /// IANA time zone, e.g. Asia/Tokyo
    #[arg(long, value_name = "TZ")]
    pub timezone: Option<String>,

    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    #[arg(long, value_name = "N")]
    pub max_concurrent_tasks: Option<usize>,

    #[arg(long, value_name = "MINUTES")]
    pub timeout_minutes: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerAction {
    Start,
    Stop,
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "test")]
    Test,
    #[value(name = "staging")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    #[value(name = "error")]
    Error,
    #[value(name = "warn", alias = "warning")]
    Warn,
    #[value(name = "info")]
    Info,
    #[value(name = "debug")]
    Debug,
    #[value(name = "trace")]
    Trace,
}

impl Commands {
    /// Whether the command talks to a running instance instead of being one
    pub fn is_remote(&self) -> bool {
        !matches!(self, Commands::Serve { .. })
    }
}

impl Cli {
    /// Checks beyond what clap enforces
    pub fn validate(&self) -> Result<(), String> {
        if let Some(Commands::Serve {
            host: Some(host),
            port: Some(port),
            ..
        }) = &self.command
            && host == "0.0.0.0"
            && *port < 1024
        {
            return Err(
                "Binding to 0.0.0.0 on a privileged port (< 1024) typically requires root privileges"
                    .to_string(),
            );
        }

        if let Some(Commands::Trigger { job_id, .. } | Commands::Cancel { job_id }) = &self.command
            && job_id.trim().is_empty()
        {
            return Err("Job id cannot be empty".to_string());
        }

        Ok(())
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => "error".to_string(),
            LogLevel::Warn => "warn".to_string(),
            LogLevel::Info => "info".to_string(),
            LogLevel::Debug => "debug".to_string(),
            LogLevel::Trace => "trace".to_string(),
        }
    }
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Test => crate::config::Environment::Test,
            Environment::Staging => crate::config::Environment::Staging,
            Environment::Production => crate::config::Environment::Production,
        }
    }
}
