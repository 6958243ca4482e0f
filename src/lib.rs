//! diet-batch
//!
//! Background processing for the Diet Issue Tracker: a prioritised task queue
//! with dependencies, retries and persistence, and a runner for the daily
//! batch jobs, exposed over a small HTTP API.

use shadow_rs::shadow;
shadow!(build);

pub mod api;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod external;
pub mod jobs;
pub mod logger;
pub mod server;
pub mod services;
pub mod state;
pub mod tasks;
pub mod utils;

pub use state::AppState;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}
