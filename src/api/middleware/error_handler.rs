//! Error handler for converting AppError to HTTP responses.
//!
//! Every error leaving the API has the [`ErrorResponse`] shape. Handler
//! errors go through `IntoResponse for AppError`; plain-text responses
//! produced by axum itself (unknown route, wrong method, ...) are rewritten
//! by [`global_error_handler`].

use axum::{
    Json,
    extract::{Request, rejection::JsonRejection},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::api::dto::ErrorResponse;
use crate::api::middleware::RequestId;
use crate::error::AppError;

/// Largest body read back when rewriting a non-JSON error response
const MAX_ERROR_BODY: usize = 64 * 1024;

impl IntoResponse for AppError {
    /// # Status Code Mapping
    /// - NotFound → 404
    /// - Duplicate, Conflict, Cancelled → 409
    /// - Validation, BadRequest → 400
    /// - CapacityExceeded → 503
    /// - External → 502
    /// - Timeout → 504
    /// - Configuration, Internal → 500
    fn into_response(self) -> Response {
        let status = error_to_status_code(&self);
        let body = match &self {
            AppError::NotFound { entity, field, value } => {
                ErrorResponse::not_found_error(entity, field, value)
            }
            AppError::Duplicate { entity, field, value } => {
                ErrorResponse::duplicate_error(entity, field, value)
            }
            AppError::Validation { field, reason } => ErrorResponse::validation_error(field, reason),
            AppError::BadRequest { message }
            | AppError::Conflict { message }
            | AppError::Cancelled { message } => ErrorResponse::new(error_to_code(&self), message),
            AppError::CapacityExceeded { capacity } => {
                ErrorResponse::new(error_to_code(&self), &self.to_string())
                    .with_details(json!({ "capacity": capacity }))
            }
            AppError::External { service, .. } => ErrorResponse::new(
                error_to_code(&self),
                &format!("Upstream service {} failed", service),
            )
            .with_details(json!({ "service": service })),
            AppError::Timeout { seconds } => {
                ErrorResponse::new(error_to_code(&self), &self.to_string())
                    .with_details(json!({ "seconds": seconds }))
            }
            AppError::Configuration { key, .. } => {
                tracing::error!(error = ?self, "Configuration error while handling request");
                ErrorResponse::new(error_to_code(&self), &format!("Configuration error: {}", key))
                    .with_details(json!({ "key": key }))
            }
            AppError::Internal { .. } => {
                tracing::error!(error = ?self, "Internal error while handling request");
                ErrorResponse::new(error_to_code(&self), "An internal error occurred")
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Maps an AppError variant to its HTTP status code.
pub fn error_to_status_code(error: &AppError) -> StatusCode {
    match error {
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Duplicate { .. } => StatusCode::CONFLICT,
        AppError::Validation { .. } => StatusCode::BAD_REQUEST,
        AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        AppError::Conflict { .. } => StatusCode::CONFLICT,
        AppError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::External { .. } => StatusCode::BAD_GATEWAY,
        AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AppError::Cancelled { .. } => StatusCode::CONFLICT,
        AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Maps an AppError variant to its error code string.
pub fn error_to_code(error: &AppError) -> &'static str {
    match error {
        AppError::NotFound { .. } => "NOT_FOUND",
        AppError::Duplicate { .. } => "DUPLICATE_ENTRY",
        AppError::Validation { .. } => "VALIDATION_ERROR",
        AppError::BadRequest { .. } => "BAD_REQUEST",
        AppError::Conflict { .. } => "CONFLICT",
        AppError::CapacityExceeded { .. } => "QUEUE_FULL",
        AppError::Configuration { .. } => "CONFIGURATION_ERROR",
        AppError::External { .. } => "UPSTREAM_ERROR",
        AppError::Timeout { .. } => "TIMEOUT",
        AppError::Cancelled { .. } => "CANCELLED",
        AppError::Internal { .. } => "INTERNAL_ERROR",
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match &rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON body: {}", err.body_text()),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err.body_text()),
            JsonRejection::MissingJsonContentType(_) => {
                "Expected request with `Content-Type: application/json`".to_string()
            }
            JsonRejection::BytesRejection(_) => "Failed to read request body".to_string(),
            other => other.body_text(),
        };
        AppError::BadRequest { message }
    }
}

/// Rewrites error responses that are not JSON into an [`ErrorResponse`]
/// carrying the request id.
pub async fn global_error_handler(request: Request, next: Next) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.as_str().to_string());
    let response = next.run(request).await;

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    if is_json {
        return response;
    }

    let (parts, body) = response.into_parts();
    let original = axum::body::to_bytes(body, MAX_ERROR_BODY)
        .await
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default();

    let (code, fallback) = match status {
        StatusCode::NOT_FOUND => ("NOT_FOUND", "The requested resource was not found"),
        StatusCode::METHOD_NOT_ALLOWED => {
            ("METHOD_NOT_ALLOWED", "HTTP method not allowed for this endpoint")
        }
        StatusCode::UNSUPPORTED_MEDIA_TYPE => ("UNSUPPORTED_MEDIA_TYPE", "Unsupported media type"),
        StatusCode::PAYLOAD_TOO_LARGE => ("PAYLOAD_TOO_LARGE", "Request payload too large"),
        StatusCode::REQUEST_TIMEOUT => ("REQUEST_TIMEOUT", "Request timeout"),
        s if s.is_server_error() => ("INTERNAL_SERVER_ERROR", "An internal server error occurred"),
        _ => ("BAD_REQUEST", "Bad request"),
    };
    let message = if original.is_empty() { fallback } else { original.as_str() };

    let mut body = ErrorResponse::new(code, message);
    if let Some(id) = request_id {
        body = body.with_request_id(&id);
    }
    (parts.status, Json(body)).into_response()
}
