//! Application state for Axum web framework.
//!
//! Owns the explicitly constructed services: the task queue, the scheduled
//! job runner and the collaborators they share. The server builds one
//! `AppState`, starts its background loops and tears them down on exit.

use std::sync::Arc;

use jiff::Timestamp;

use crate::cache::RecordCache;
use crate::clock::{SharedClock, SystemClock};
use crate::config::settings::Settings;
use crate::error::{AppError, AppResult};
use crate::external::{AirtableClient, MemoryRecordStore, RecordStore, TableNames};
use crate::jobs::{JobDeps, ScheduledJobRunner, default_registry};
use crate::services::NotificationService;
use crate::tasks::processors::{ProcessorDeps, register_default_processors};
use crate::tasks::store::{TaskStore, build_store};
use crate::tasks::BatchProcessor;

/// Cloning is cheap; every service shares its state through an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub processor: BatchProcessor,
    pub runner: ScheduledJobRunner,
    pub cache: RecordCache,
    pub records: Arc<dyn RecordStore>,
    pub notifier: NotificationService,
    pub clock: SharedClock,
    pub started_at: Timestamp,
}

impl AppState {
    /// Builds the services described by `settings` on the system clock.
    ///
    /// Airtable is used when credentials are configured, otherwise an empty
    /// in-memory record store.
    pub async fn from_settings(settings: &Settings) -> AppResult<Self> {
        let records: Arc<dyn RecordStore> = if settings.airtable.is_configured() {
            Arc::new(AirtableClient::new(&settings.airtable)?)
        } else {
            tracing::warn!("Airtable is not configured, using an in-memory record store");
            Arc::new(MemoryRecordStore::new())
        };

        let store = build_store(&settings.persistence)
            .await
            .map_err(|e| AppError::Configuration {
                key: "persistence".to_string(),
                source: anyhow::Error::from(e),
            })?;

        Self::assemble(settings, records, store, Arc::new(SystemClock))
    }

    /// Wires the services around the given record store, task store and clock.
    pub fn assemble(
        settings: &Settings,
        records: Arc<dyn RecordStore>,
        store: Arc<dyn TaskStore>,
        clock: SharedClock,
    ) -> AppResult<Self> {
        let notifier = NotificationService::from_config(&settings.notifications)?;
        let cache = RecordCache::new();
        let tables = TableNames::from(&settings.airtable);

        let processor = BatchProcessor::new(settings.processor.clone(), store, clock.clone());
        register_default_processors(
            &processor,
            &ProcessorDeps {
                records: records.clone(),
                cache: cache.clone(),
                notifier: notifier.clone(),
                tables: tables.clone(),
                clock: clock.clone(),
            },
        );

        let registry = default_registry(&JobDeps {
            records: records.clone(),
            cache: cache.clone(),
            tables,
            clock: clock.clone(),
            processor: Some(processor.clone()),
            task_retention_hours: u64::from(settings.scheduler.history_retention_days) * 24,
        });
        let runner =
            ScheduledJobRunner::new(&settings.scheduler, registry, notifier.clone(), clock.clone());

        Ok(Self {
            processor,
            runner,
            cache,
            records,
            notifier,
            started_at: clock.now(),
            clock,
        })
    }
}
