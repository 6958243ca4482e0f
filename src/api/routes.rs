//! Router configuration for the API.

use std::time::Duration;

use axum::{Router, middleware};
use tower_http::timeout::TimeoutLayer;

use crate::api::handlers;
use crate::api::middleware::{global_error_handler, logging_middleware, request_id_middleware};
use crate::config::settings::ServerConfig;
use crate::state::AppState;

/// Creates the application router with all routes and middleware.
///
/// # Middleware Order
/// Middleware is applied in reverse order of declaration (last added runs first):
/// 1. Request ID - generates/propagates request IDs
/// 2. Logging - logs requests with their request ID
/// 3. Error shaping - rewrites non-JSON error responses
/// 4. Timeout - answers 408 after `server.request_timeout` seconds
///
/// # Routes
/// - `/health`
/// - `/api/batch/...` - scheduled jobs and the scheduler
/// - `/api/tasks/...` - task queue
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .nest("/batch", handlers::batch::batch_routes())
        .nest("/tasks", handlers::tasks::task_routes());

    Router::new()
        .merge(handlers::health::health_routes())
        .nest("/api", api_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(server.request_timeout)))
        .layer(middleware::from_fn(global_error_handler))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::REQUEST_ID_HEADER;
    use crate::clock::ManualClock;
    use crate::config::settings::Settings;
    use crate::external::MemoryRecordStore;
    use crate::tasks::store::NoopTaskStore;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::assemble(
            &Settings::default(),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(NoopTaskStore),
            Arc::new(ManualClock::new("2026-03-10T09:00:00Z".parse().unwrap())),
        )
        .unwrap()
    }

    fn app(state: &AppState) -> Router {
        create_router(state.clone(), &ServerConfig::default())
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn cache_refresh_task(task_id: &str) -> Value {
        json!({
            "payload": { "type": "cache_refresh", "data": { "tables": ["Issues"] } },
            "priority": "high",
            "task_id": task_id
        })
    }

    #[tokio::test]
    async fn test_health_reports_stopped_loops() {
        let state = state();
        let (status, body) = send(app(&state), Method::GET, "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["checks"]["processor"]["status"], "degraded");
        assert_eq!(body["checks"]["record_store"]["message"], "memory");
    }

    #[tokio::test]
    async fn test_list_jobs() {
        let state = state();
        let (status, body) = send(app(&state), Method::GET, "/api/batch/jobs", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scheduler_running"], false);
        let ids: Vec<&str> = body["jobs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|j| j["job_id"].as_str().unwrap())
            .collect();
        assert!(ids.contains(&"daily_relationship_update"));
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let state = state();
        let (status, body) =
            send(app(&state), Method::GET, "/api/batch/jobs/nightly_reindex", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["details"]["value"], "nightly_reindex");
    }

    #[tokio::test]
    async fn test_trigger_job() {
        let state = state();
        let (status, body) = send(
            app(&state),
            Method::POST,
            "/api/batch/jobs/hourly_cache_refresh/trigger",
            Some(json!({ "force_run": true })),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["force_run"], true);
        assert!(
            body["execution_id"]
                .as_str()
                .unwrap()
                .starts_with("hourly_cache_refresh_")
        );
        state.runner.shutdown().await;
    }

    #[tokio::test]
    async fn test_trigger_without_body() {
        let state = state();
        let (status, body) = send(
            app(&state),
            Method::POST,
            "/api/batch/jobs/hourly_cache_refresh/trigger",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["force_run"], false);
        state.runner.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_job_config() {
        let state = state();
        let uri = "/api/batch/jobs/daily_data_cleanup/config";

        let (status, body) = send(
            app(&state),
            Method::PUT,
            uri,
            Some(json!({ "batch_size": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = send(app(&state), Method::PUT, uri, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");

        let (status, body) = send(
            app(&state),
            Method::PUT,
            uri,
            Some(json!({ "enabled": false, "schedule_time": "06:15" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], false);

        let (_, body) = send(app(&state), Method::GET, uri, None).await;
        assert_eq!(body["enabled"], false);
    }

    #[tokio::test]
    async fn test_scheduler_start_stop() {
        let state = state();
        let (_, body) = send(app(&state), Method::POST, "/api/batch/scheduler/start", None).await;
        assert_eq!(body["running"], true);

        let (_, body) = send(app(&state), Method::POST, "/api/batch/scheduler/stop", None).await;
        assert_eq!(body["running"], false);
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let state = state();

        let (status, body) = send(
            app(&state),
            Method::POST,
            "/api/tasks",
            Some(cache_refresh_task("refresh-issues")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["task_id"], "refresh-issues");
        assert_eq!(body["status"], "queued");

        let (status, body) =
            send(app(&state), Method::GET, "/api/tasks/refresh-issues", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["priority"], "high");
        assert_eq!(body["payload"]["type"], "cache_refresh");

        let (status, body) =
            send(app(&state), Method::DELETE, "/api/tasks/refresh-issues", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], true);

        let (_, body) = send(app(&state), Method::GET, "/api/tasks/refresh-issues", None).await;
        assert_eq!(body["status"], "cancelled");

        let (status, _) = send(app(&state), Method::GET, "/api/tasks/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_duplicate_task_is_conflict() {
        let state = state();
        let (status, _) = send(
            app(&state),
            Method::POST,
            "/api/tasks",
            Some(cache_refresh_task("t1")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            app(&state),
            Method::POST,
            "/api/tasks",
            Some(cache_refresh_task("t1")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "DUPLICATE_ENTRY");
    }

    #[tokio::test]
    async fn test_malformed_task_body() {
        let state = state();
        let (status, body) = send(
            app(&state),
            Method::POST,
            "/api/tasks",
            Some(json!({ "payload": { "type": "reindex", "data": {} } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_stats_and_cleanup() {
        let state = state();
        let (status, body) = send(app(&state), Method::GET, "/api/tasks/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["registered_kinds"].as_array().unwrap().len(), 5);
        assert_eq!(body["running"], false);

        let (status, body) = send(
            app(&state),
            Method::POST,
            "/api/tasks/cleanup",
            Some(json!({ "max_age_hours": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 0);
    }

    #[tokio::test]
    async fn test_unknown_route_gets_json_error_with_request_id() {
        let state = state();
        let response = app(&state)
            .oneshot(
                Request::builder()
                    .uri("/api/nothing")
                    .header(REQUEST_ID_HEADER, "req-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-7");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["request_id"], "req-7");
    }
}
