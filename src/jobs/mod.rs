//! Scheduled batch jobs.
//!
//! [`ScheduledJobRunner`] owns a fixed set of named jobs, each firing once a
//! day at a local time of day. Job bodies live in [`tasks`] and process
//! records in bounded, concurrent slices through [`executor`].

pub mod executor;
pub mod models;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod tasks;
pub mod types;

#[cfg(test)]
mod tests;

pub use executor::{ItemOutcome, JobProgress, ProgressSnapshot, run_in_batches};
pub use models::{BatchJobConfig, BatchJobExecution, JobConfigUpdate, default_jobs};
pub use registry::JobRegistry;
pub use runner::{JobOverview, RunnerStatus, ScheduledJobRunner};
pub use scheduler::{ScheduleTime, parse_schedule_time};
pub use tasks::{JobDeps, default_registry};
pub use types::{JobBody, JobContext, JobReport, JobStatus, JobType, Trigger};
