//! Server module for managing the service lifecycle
//!
//! Builds the application state, starts the task processor and the job
//! scheduler, serves the HTTP API and tears everything down on shutdown.

use crate::api::routes::create_router;
use crate::config::{Environment, settings::Settings};
use crate::state::AppState;
use tokio::net::TcpListener;
use tokio::signal;

pub struct Server {
    settings: Settings,
}

impl Server {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Start the service and run until a shutdown signal
    ///
    /// Order of startup:
    /// 1. build the services (record store, task store, processors, jobs)
    /// 2. replay persisted tasks when `persistence.restore_on_startup` is set
    /// 3. start the processing loop and, if enabled, the scheduler
    /// 4. serve HTTP until Ctrl+C or SIGTERM
    ///
    /// On shutdown the scheduler is stopped and running executions are
    /// cancelled, then the processor drains within its grace period.
    ///
    /// # Errors
    /// - invalid Airtable, persistence or notification configuration
    /// - address binding errors
    /// - server runtime errors
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = &self.settings;
        tracing::info!(
            app_name = %settings.application.name,
            app_version = %settings.application.version,
            environment = %Environment::from_env().as_str(),
            "Application starting"
        );
        tracing::info!(
            host = %settings.server.host,
            port = settings.server.port,
            request_timeout = settings.server.request_timeout,
            "Server configuration loaded"
        );
        tracing::info!(
            batch_size = settings.processor.batch_size,
            max_concurrent_tasks = settings.processor.max_concurrent_tasks,
            max_queue_size = settings.processor.max_queue_size,
            persistence = ?settings.persistence.backend,
            "Processor configuration loaded"
        );
        tracing::info!(
            enabled = settings.scheduler.enabled,
            timezone = %settings.scheduler.timezone,
            check_interval_seconds = settings.scheduler.check_interval_seconds,
            overrides = settings.scheduler.jobs.len(),
            "Scheduler configuration loaded"
        );
        tracing::info!(
            airtable_configured = settings.airtable.is_configured(),
            notifications_enabled = settings.notifications.enabled,
            "Integrations configured"
        );

        let state = AppState::from_settings(settings).await?;
        tracing::info!("Application state created");

        if settings.persistence.restore_on_startup {
            match state.processor.restore().await {
                Ok(restored) => tracing::info!(restored, "Persisted tasks restored"),
                Err(e) => tracing::warn!(error = %e, "Failed to restore persisted tasks"),
            }
        }

        state.processor.start_processing();
        if settings.scheduler.enabled {
            state.runner.start();
        } else {
            tracing::info!("Job scheduler disabled by configuration");
        }

        let router = create_router(state.clone(), &settings.server);

        let address = settings.server.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!(error = %e, address = %address, "Failed to bind to address");
            anyhow::anyhow!("Failed to bind to {}: {}", address, e)
        })?;
        tracing::info!(address = %address, "Server listening");

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        tracing::info!("Stopping background work");
        state.runner.shutdown().await;
        state.processor.stop_processing().await;
        tracing::info!("Server shutdown complete");

        served.map_err(Into::into)
    }
}

/// Waits for Ctrl+C or SIGTERM.
///
/// A signal handler that cannot be installed never fires; the other one
/// still can.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
