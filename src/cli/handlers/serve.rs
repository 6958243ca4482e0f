//! Serve command handler
//!
//! Runs the service, or with `--dry-run` only checks the configuration.

use crate::config::settings::Settings;
use crate::error::AppResult;
use crate::server::Server;

pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub async fn execute(self, dry_run: bool) -> anyhow::Result<()> {
        if dry_run {
            self.validate_only()?;
            return Ok(());
        }
        Server::new(self.config).run().await
    }

    /// Validate the configuration and print what the service would do
    pub fn validate_only(&self) -> AppResult<()> {
        self.config.validate()?;

        let settings = &self.config;
        println!("✓ Configuration is valid");
        println!("✓ Server would bind to: {}", settings.server.address());
        println!(
            "✓ Task queue: {} slots, batches of {}, capacity {}",
            settings.processor.max_concurrent_tasks,
            settings.processor.batch_size,
            settings.processor.max_queue_size
        );
        println!("✓ Task persistence: {:?}", settings.persistence.backend);
        if settings.airtable.is_configured() {
            println!("✓ Airtable base {} is configured", settings.airtable.base_id);
        } else {
            println!("! Airtable is not configured, records would be kept in memory");
        }
        println!(
            "✓ Scheduler {} ({} job overrides, timezone {})",
            if settings.scheduler.enabled { "enabled" } else { "disabled" },
            settings.scheduler.jobs.len(),
            settings.scheduler.timezone
        );

        println!("Dry run completed successfully - configuration is ready for deployment");
        Ok(())
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}
