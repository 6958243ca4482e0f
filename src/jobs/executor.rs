//! Item-level execution for job bodies.
//!
//! Items run in slices of `batch_size`; inside a slice at most
//! `max_concurrent_tasks` items are in flight. Transient item failures are
//! retried `retry_attempts` times with a flat `retry_delay_seconds` pause.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::jobs::types::JobContext;

/// Error messages kept per execution
pub const MAX_REPORTED_ERRORS: usize = 50;

/// Result of one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Work was done (a record was written, a table refreshed)
    Updated,
    /// Nothing needed doing
    Unchanged,
}

/// Live counters of an execution, shared with the runner for status reads
#[derive(Debug, Default)]
pub struct JobProgress {
    total: AtomicUsize,
    processed: AtomicUsize,
    successful: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total_items: usize,
    pub processed_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub skipped_items: usize,
}

impl JobProgress {
    pub fn add_total(&self, count: usize) {
        self.total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record(&self, outcome: ItemOutcome) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            ItemOutcome::Updated => self.successful.fetch_add(1, Ordering::Relaxed),
            ItemOutcome::Unchanged => self.skipped.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_failure(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_items: self.total.load(Ordering::Relaxed),
            processed_items: self.processed.load(Ordering::Relaxed),
            successful_items: self.successful.load(Ordering::Relaxed),
            failed_items: self.failed.load(Ordering::Relaxed),
            skipped_items: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    retries: u32,
    delay: Duration,
}

fn is_transient(error: &AppError) -> bool {
    matches!(error, AppError::External { .. } | AppError::Timeout { .. })
}

async fn attempt_with_retry<F, Fut>(
    policy: RetryPolicy,
    token: &CancellationToken,
    mut attempt: F,
) -> AppResult<ItemOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<ItemOutcome>>,
{
    let mut failures = 0;
    loop {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(AppError::cancelled("execution cancelled")),
            result = attempt() => result,
        };

        match result {
            Err(e) if failures < policy.retries && is_transient(&e) => {
                failures += 1;
                tracing::debug!(error = %e, failures, "Retrying item");
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(AppError::cancelled("execution cancelled")),
                    _ = tokio::time::sleep(policy.delay) => {}
                }
            }
            other => return other,
        }
    }
}

/// Run `work` over every item and return the item error messages.
///
/// Stops starting new slices once the execution is cancelled; callers check
/// the token afterwards to turn that into a cancelled run.
pub async fn run_in_batches<T, F, Fut>(ctx: &JobContext, items: Vec<T>, work: F) -> Vec<String>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<ItemOutcome>> + Send + 'static,
{
    let work = Arc::new(work);
    let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_tasks.max(1)));
    let batch_size = ctx.config.batch_size.max(1);
    let policy = RetryPolicy {
        retries: ctx.config.retry_attempts,
        delay: Duration::from_secs(ctx.config.retry_delay_seconds),
    };

    ctx.progress.add_total(items.len());
    let mut errors = Vec::new();
    let mut items = items.into_iter();
    let mut batch_number = 0usize;

    loop {
        if ctx.is_cancelled() {
            break;
        }
        let batch: Vec<T> = items.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        batch_number += 1;

        let mut set = JoinSet::new();
        for item in batch {
            let work = Arc::clone(&work);
            let semaphore = Arc::clone(&semaphore);
            let token = ctx.cancellation_token.clone();
            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Err(AppError::cancelled("semaphore closed"));
                };
                attempt_with_retry(policy, &token, || (*work)(item.clone())).await
            });
        }

        while let Some(joined) = set.join_next().await {
            let error = match joined {
                Ok(Ok(outcome)) => {
                    ctx.progress.record(outcome);
                    continue;
                }
                Ok(Err(AppError::Cancelled { .. })) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(join_error) => format!("item task aborted: {}", join_error),
            };
            ctx.progress.record_failure();
            if errors.len() < MAX_REPORTED_ERRORS {
                errors.push(error);
            }
        }

        tracing::debug!(
            execution_id = %ctx.execution_id,
            batch = batch_number,
            progress = ?ctx.progress.snapshot(),
            "Batch finished"
        );
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::models::default_jobs;
    use crate::jobs::types::Trigger;
    use std::sync::atomic::AtomicU32;

    fn ctx(batch_size: usize, max_concurrent_tasks: usize, retry_attempts: u32) -> JobContext {
        let mut config = default_jobs("UTC").remove(0);
        config.batch_size = batch_size;
        config.max_concurrent_tasks = max_concurrent_tasks;
        config.retry_attempts = retry_attempts;
        config.retry_delay_seconds = 1;
        JobContext {
            execution_id: "exec_1".to_string(),
            config,
            trigger: Trigger::Manual,
            cancellation_token: CancellationToken::new(),
            progress: Arc::new(JobProgress::default()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_outcomes() {
        let ctx = ctx(3, 2, 0);
        let errors = run_in_batches(&ctx, (0..7).collect(), |n: u32| async move {
            match n % 3 {
                0 => Ok(ItemOutcome::Updated),
                1 => Ok(ItemOutcome::Unchanged),
                _ => Err(AppError::validation("item", format!("bad item {}", n))),
            }
        })
        .await;

        let progress = ctx.progress.snapshot();
        assert_eq!(progress.total_items, 7);
        assert_eq!(progress.processed_items, 7);
        assert_eq!(progress.successful_items, 3);
        assert_eq!(progress.skipped_items, 2);
        assert_eq!(progress.failed_items, 2);
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let ctx = ctx(10, 2, 0);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());

        run_in_batches(&ctx, (0..10).collect(), move |_: u32| {
            let (running, peak) = (r.clone(), p.clone());
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(ItemOutcome::Updated)
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let ctx = ctx(5, 1, 2);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let errors = run_in_batches(&ctx, vec![1u32], move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<ItemOutcome, _>(AppError::external("airtable", "rate limited"))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let ctx = ctx(5, 1, 2);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        run_in_batches(&ctx, vec![1u32], move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<ItemOutcome, _>(AppError::not_found("Issues", "id", "rec1"))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_stops_between_batches() {
        let ctx = ctx(2, 2, 0);
        let token = ctx.cancellation_token.clone();

        run_in_batches(&ctx, (0..6).collect(), move |n: u32| {
            let token = token.clone();
            async move {
                if n == 1 {
                    token.cancel();
                }
                Ok(ItemOutcome::Updated)
            }
        })
        .await;

        assert!(ctx.progress.snapshot().processed_items <= 2);
    }
}
