//! Command executor for dispatching CLI commands

use super::handlers::{MonitorCommandHandler, ServeCommandHandler};
use super::parser::{Cli, Commands};
use super::{ConfigurationMerger, init_logger_from_settings};
use crate::error::AppError;
use crate::logger::{LoggerConfig, init_logger};

/// Run the parsed command line.
///
/// Monitoring commands print the answer of the remote instance. `serve`, the
/// default, loads and merges configuration before starting the service.
pub async fn execute_command(cli: Cli) -> anyhow::Result<()> {
    cli.validate()
        .map_err(|reason| AppError::validation("cli_arguments", reason))?;

    match &cli.command {
        Some(command) if command.is_remote() => {
            init_client_logger(&cli)?;
            let output = MonitorCommandHandler::new(cli.api_url.clone())?
                .execute(command)
                .await?;
            println!("{}", output);
            Ok(())
        }
        Some(Commands::Serve { dry_run, .. }) => serve(&cli, *dry_run).await,
        _ => serve(&cli, false).await,
    }
}

async fn serve(cli: &Cli, dry_run: bool) -> anyhow::Result<()> {
    let settings = ConfigurationMerger::from_cli(cli)?.merge_cli_args(cli)?;
    init_logger_from_settings(&settings)?;
    tracing::debug!(app = %settings.application.name, dry_run, "Configuration loaded");

    ServeCommandHandler::new(settings).execute(dry_run).await
}

/// Console-only logging for the short-lived monitoring commands
fn init_client_logger(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let mut config = LoggerConfig::default().with_level(level);
    config.file.enabled = false;
    init_logger(config)?;
    Ok(())
}
