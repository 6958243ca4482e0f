use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Builds the HTTP client shared by the Airtable client and the
/// notification providers.
///
/// # Features
/// - **Connection pooling**: idle connections are kept for 90s
/// - **Compression**: gzip
/// - **HTTP/2**: adaptive window sizing
/// - **Timeouts**: `timeout` per request, 10s connect timeout
/// - **Security**: Rustls for TLS (no OpenSSL dependency)
pub fn build_http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        // Timeouts
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        // Connection pooling
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .http2_adaptive_window(true)
        .gzip(true)
        .user_agent(format!("diet-batch/{}", crate::pkg_version()))
        .build()
        .map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e).context("failed to build HTTP client"),
        })
}
