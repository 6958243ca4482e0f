//! Health check endpoint handlers.
//!
//! Reports whether the background loops are running. A stopped loop
//! degrades the service but never fails the check: the API itself still
//! answers.

use crate::api::dto::{ComponentHealth, HealthResponse, HealthStatus};
use crate::state::AppState;
use axum::{Json, Router, extract::State, routing::get};
use std::collections::BTreeMap;

/// # Routes
/// - `GET /health` - component health
/// - `GET /health/live` - liveness probe
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = BTreeMap::new();

    let stats = state.processor.stats().await;
    let processor = if stats.running {
        ComponentHealth::healthy(format!(
            "{} queued, {} active, {} free slots",
            stats.queued, stats.active, stats.available_slots
        ))
    } else {
        ComponentHealth::degraded("processing loop stopped")
    };
    checks.insert("processor".to_string(), processor);

    let scheduler = if state.runner.is_running() {
        ComponentHealth::healthy("scheduling loop running")
    } else {
        ComponentHealth::degraded("scheduling loop stopped")
    };
    checks.insert("scheduler".to_string(), scheduler);

    checks.insert(
        "record_store".to_string(),
        ComponentHealth::healthy(state.records.name()),
    );

    let now = state.clock.now();
    Json(HealthResponse {
        status: HealthStatus::overall(checks.values()),
        version: crate::pkg_version().to_string(),
        timestamp: now.to_string(),
        uptime_seconds: now.duration_since(state.started_at).as_secs(),
        checks,
    })
}

/// Always OK while the process can answer
pub async fn liveness_check() -> &'static str {
    "OK"
}
