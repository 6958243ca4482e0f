//! Scheduled job endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::api::dto::{
    CancelJobResponse, JobStatusResponse, SchedulerStateResponse, TriggerJobRequest,
    TriggerJobResponse,
};
use crate::error::{AppError, AppResult};
use crate::jobs::{BatchJobConfig, JobConfigUpdate, RunnerStatus};
use crate::state::AppState;
use crate::utils::ValidatedJson;

/// # Routes
/// - `GET /jobs` - every job with active and recent executions
/// - `GET /jobs/{job_id}` - one job and its latest execution
/// - `POST /jobs/{job_id}/trigger` - run now
/// - `POST /jobs/{job_id}/cancel` - cancel the running execution
/// - `GET|PUT /jobs/{job_id}/config` - read or update the configuration
/// - `GET /scheduler`, `POST /scheduler/start`, `POST /scheduler/stop`
pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/trigger", post(trigger_job))
        .route("/jobs/{job_id}/cancel", post(cancel_job))
        .route("/jobs/{job_id}/config", get(get_job_config).put(update_job_config))
        .route("/scheduler", get(scheduler_state))
        .route("/scheduler/start", post(start_scheduler))
        .route("/scheduler/stop", post(stop_scheduler))
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<RunnerStatus> {
    Json(state.runner.get_all_job_statuses().await)
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<JobStatusResponse>> {
    let overview = state
        .runner
        .job_overview(&job_id)
        .await
        .ok_or_else(|| AppError::not_found("Job", "job_id", job_id.as_str()))?;
    let latest_execution = state.runner.get_job_status(&job_id).await;

    Ok(Json(JobStatusResponse {
        overview,
        latest_execution,
    }))
}

/// Starts a run in the background and answers `202 Accepted` with its id.
///
/// The body is optional; without it the running guard applies.
pub async fn trigger_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Option<Json<TriggerJobRequest>>,
) -> AppResult<(StatusCode, Json<TriggerJobResponse>)> {
    let force_run = body.map(|Json(b)| b.force_run).unwrap_or(false);
    let execution_id = state.runner.trigger_job(&job_id, force_run).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerJobResponse {
            job_id,
            execution_id,
            force_run,
        }),
    ))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<CancelJobResponse>> {
    if state.runner.get_job_configuration(&job_id).await.is_none() {
        return Err(AppError::not_found("Job", "job_id", job_id));
    }
    let cancelled = state.runner.cancel_job(&job_id).await;
    Ok(Json(CancelJobResponse { job_id, cancelled }))
}

pub async fn get_job_config(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<BatchJobConfig>> {
    state
        .runner
        .get_job_configuration(&job_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found("Job", "job_id", job_id))
}

pub async fn update_job_config(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    ValidatedJson(update): ValidatedJson<JobConfigUpdate>,
) -> AppResult<Json<BatchJobConfig>> {
    if update.is_empty() {
        return Err(AppError::BadRequest {
            message: "No configuration fields to update".to_string(),
        });
    }
    let config = state.runner.update_job_configuration(&job_id, update).await?;
    Ok(Json(config))
}

async fn scheduler_response(state: &AppState) -> SchedulerStateResponse {
    SchedulerStateResponse {
        running: state.runner.is_running(),
        active_executions: state.runner.get_all_job_statuses().await.active.len(),
    }
}

pub async fn scheduler_state(State(state): State<AppState>) -> Json<SchedulerStateResponse> {
    Json(scheduler_response(&state).await)
}

pub async fn start_scheduler(State(state): State<AppState>) -> Json<SchedulerStateResponse> {
    state.runner.start();
    Json(scheduler_response(&state).await)
}

pub async fn stop_scheduler(State(state): State<AppState>) -> Json<SchedulerStateResponse> {
    state.runner.stop().await;
    Json(scheduler_response(&state).await)
}
