//! Task queue endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::api::dto::{
    CancelTaskResponse, CleanupTasksRequest, CleanupTasksResponse, CreateTaskRequest,
    CreateTaskResponse,
};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::tasks::{BatchTask, NewTask, ProcessorStats, TaskStatus};
use crate::utils::ValidatedJson;

/// # Routes
/// - `POST /` - queue a task
/// - `GET /stats` - queue and processor counters
/// - `POST /cleanup` - purge finished tasks
/// - `GET /{task_id}` - task snapshot
/// - `DELETE /{task_id}` - cancel a queued or running task
pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_task))
        .route("/stats", get(task_stats))
        .route("/cleanup", post(cleanup_tasks))
        .route("/{task_id}", get(get_task).delete(cancel_task))
}

/// Queues a task and answers `201 Created` with its id.
///
/// # Errors
/// - 400 for an invalid payload or task id
/// - 409 when the task id is already known
/// - 503 when the queue is full
pub async fn create_task(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<CreateTaskResponse>)> {
    let task_id = state.processor.add_task(NewTask::from(request)).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse {
            task_id,
            status: TaskStatus::Queued,
        }),
    ))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<BatchTask>> {
    state
        .processor
        .get_task_status(&task_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found("Task", "task_id", task_id))
}

/// Unknown tasks are 404; finished ones answer `cancelled: false`.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<CancelTaskResponse>> {
    if state.processor.get_task_status(&task_id).await.is_none() {
        return Err(AppError::not_found("Task", "task_id", task_id));
    }
    let cancelled = state.processor.cancel_task(&task_id).await;
    Ok(Json(CancelTaskResponse { task_id, cancelled }))
}

pub async fn cleanup_tasks(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CleanupTasksRequest>,
) -> Json<CleanupTasksResponse> {
    let removed = state
        .processor
        .cleanup_completed_tasks(request.max_age_hours)
        .await;
    Json(CleanupTasksResponse {
        removed,
        max_age_hours: request.max_age_hours,
    })
}

pub async fn task_stats(State(state): State<AppState>) -> Json<ProcessorStats> {
    Json(state.processor.stats().await)
}
