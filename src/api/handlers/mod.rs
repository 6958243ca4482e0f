//! Route handlers: `batch` for the job runner, `tasks` for the queue.

pub mod batch;
pub mod health;
pub mod tasks;
