//! Command line interface
//!
//! Argument parsing, configuration merging and the command handlers for
//! `serve` and the monitoring commands.

pub mod config_merger;
pub mod executor;
pub mod handlers;
pub mod parser;
pub mod validation;

pub use config_merger::ConfigurationMerger;
pub use executor::execute_command;
pub use parser::{Cli, Commands, ConfigArgs, Environment, LogLevel, SchedulerAction};

use anyhow::Context;

use crate::config::settings::Settings;
use crate::logger::init_logger;

/// Install the global logger described by `settings`
pub fn init_logger_from_settings(settings: &Settings) -> anyhow::Result<()> {
    let logger_config = settings
        .logger
        .clone()
        .into_logger_config()
        .context("Logger configuration error")?;

    init_logger(logger_config).context("Logger initialization error")
}
