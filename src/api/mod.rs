//! HTTP surface of the batch service.
//!
//! `/health` plus `/api/batch` for the scheduled jobs and `/api/tasks` for
//! the task queue. Handlers are thin wrappers over [`crate::AppState`].

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod routes;
