//! Batch processor: priority queues, dependency gating, bounded execution.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::clock::{SharedClock, SystemClock};
use crate::config::settings::ProcessorConfig;
use crate::error::{AppError, AppResult};
use crate::tasks::model::{BatchTask, NewTask};
use crate::tasks::queue::{Eligibility, PriorityQueues};
use crate::tasks::registry::{ProcessorRegistry, TaskProcessor};
use crate::tasks::store::{NoopTaskStore, TaskStore};
use crate::tasks::types::{TaskContext, TaskKind, TaskPriority, TaskStatus};

static TASK_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("task id pattern is valid"));

/// Longest cleanup window accepted, about 114 years
const MAX_CLEANUP_HOURS: u64 = 1_000_000;

struct ActiveTask {
    task: BatchTask,
    token: CancellationToken,
}

struct ProcessorState {
    queues: PriorityQueues,
    active: HashMap<String, ActiveTask>,
    completed: HashMap<String, BatchTask>,
    /// Failed and cancelled tasks
    failed: HashMap<String, BatchTask>,
}

impl ProcessorState {
    fn new(max_queue_size: usize) -> Self {
        Self {
            queues: PriorityQueues::new(max_queue_size),
            active: HashMap::new(),
            completed: HashMap::new(),
            failed: HashMap::new(),
        }
    }

    fn knows(&self, task_id: &str) -> bool {
        self.active.contains_key(task_id)
            || self.completed.contains_key(task_id)
            || self.failed.contains_key(task_id)
            || self.queues.contains(task_id)
    }
}

struct Lifecycle {
    loop_token: Option<CancellationToken>,
    loop_handle: Option<JoinHandle<()>>,
    /// Parent of every task token; cancelled when stop runs out of grace
    shutdown: CancellationToken,
}

struct Inner {
    config: ProcessorConfig,
    state: Mutex<ProcessorState>,
    registry: RwLock<ProcessorRegistry>,
    semaphore: Arc<Semaphore>,
    store: Arc<dyn TaskStore>,
    clock: SharedClock,
    tracker: TaskTracker,
    lifecycle: std::sync::Mutex<Lifecycle>,
}

enum Outcome {
    Success(JsonValue),
    Failure(String),
    Cancelled,
}

enum Finish {
    Completed(JsonValue),
    Failed(String),
    Cancelled(String),
}

/// Counters reported by [`BatchProcessor::stats`]
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorStats {
    pub running: bool,
    pub queued: usize,
    pub queued_by_priority: HashMap<TaskPriority, usize>,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub available_slots: usize,
    pub registered_kinds: Vec<TaskKind>,
}

/// Accepts tasks, drains eligible batches on an interval and runs them on a
/// bounded number of slots.
///
/// Cheap to clone; clones share the same queues and workers.
#[derive(Clone)]
pub struct BatchProcessor {
    inner: Arc<Inner>,
}

impl BatchProcessor {
    pub fn new(config: ProcessorConfig, store: Arc<dyn TaskStore>, clock: SharedClock) -> Self {
        let permits = config.max_concurrent_tasks.max(1);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ProcessorState::new(config.max_queue_size)),
                registry: RwLock::new(ProcessorRegistry::new()),
                semaphore: Arc::new(Semaphore::new(permits)),
                store,
                clock,
                tracker: TaskTracker::new(),
                lifecycle: std::sync::Mutex::new(Lifecycle {
                    loop_token: None,
                    loop_handle: None,
                    shutdown: CancellationToken::new(),
                }),
                config,
            }),
        }
    }

    /// Processor without persistence, reading the system clock
    pub fn in_memory(config: ProcessorConfig) -> Self {
        Self::new(config, Arc::new(NoopTaskStore), Arc::new(SystemClock))
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.inner.config
    }

    /// Register the processor for its payload kind, replacing any earlier one.
    pub fn register_processor<P: TaskProcessor>(&self, processor: P) {
        let mut registry = self
            .inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        registry.register(processor);
    }

    pub fn registered_kinds(&self) -> Vec<TaskKind> {
        self.inner
            .registry
            .read()
            .map(|r| r.kinds())
            .unwrap_or_default()
    }

    /// Queue a new task and return its id.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed id or payload
    /// - `Duplicate` when the id is already known in any state
    /// - `CapacityExceeded` when the queues are full
    pub async fn add_task(&self, new_task: NewTask) -> AppResult<String> {
        new_task.payload.validate()?;

        let task_id = match &new_task.task_id {
            Some(id) => id.clone(),
            None => Uuid::new_v4().to_string(),
        };
        if !TASK_ID_PATTERN.is_match(&task_id) {
            return Err(AppError::validation(
                "task_id",
                "must be 1 to 128 characters of letters, digits, '-' or '_'",
            ));
        }

        let task = new_task.into_task(
            task_id.clone(),
            self.inner.config.default_max_retries,
            self.inner.config.default_timeout_seconds,
            self.inner.clock.now(),
        );

        {
            let mut state = self.inner.state.lock().await;
            if state.knows(&task_id) {
                return Err(AppError::Duplicate {
                    entity: "task".to_string(),
                    field: "task_id".to_string(),
                    value: task_id,
                });
            }
            state.queues.enqueue(task.clone())?;
        }

        tracing::info!(
            task_id = %task.task_id,
            task_kind = %task.kind,
            priority = %task.priority,
            depends_on = ?task.depends_on,
            "Task queued"
        );
        self.inner.persist(&task).await;

        Ok(task_id)
    }

    /// Snapshot of a task, searching active, completed, failed, then queued.
    pub async fn get_task_status(&self, task_id: &str) -> Option<BatchTask> {
        let state = self.inner.state.lock().await;
        state
            .active
            .get(task_id)
            .map(|a| a.task.clone())
            .or_else(|| state.completed.get(task_id).cloned())
            .or_else(|| state.failed.get(task_id).cloned())
            .or_else(|| state.queues.get(task_id).cloned())
    }

    /// Cancel a queued or running task.
    ///
    /// A queued task moves straight to `Cancelled`. For a running task the
    /// cancellation token is triggered and the attempt settles as
    /// `Cancelled` shortly after. Returns `false` for unknown or finished
    /// tasks.
    pub async fn cancel_task(&self, task_id: &str) -> bool {
        let now = self.inner.clock.now();
        let cancelled = {
            let mut state = self.inner.state.lock().await;
            if let Some(mut task) = state.queues.remove(task_id) {
                task.mark_cancelled("Cancelled before execution", now);
                state.failed.insert(task.task_id.clone(), task.clone());
                Some(task)
            } else if let Some(active) = state.active.get(task_id) {
                active.token.cancel();
                tracing::info!(task_id = %task_id, status = %active.task.status, "Cancellation requested");
                return true;
            } else {
                None
            }
        };

        match cancelled {
            Some(task) => {
                tracing::info!(task_id = %task.task_id, "Queued task cancelled");
                self.inner.persist(&task).await;
                true
            }
            None => false,
        }
    }

    /// Drop completed and failed tasks that finished at or before
    /// `now - max_age_hours`. Returns how many were removed.
    pub async fn cleanup_completed_tasks(&self, max_age_hours: u64) -> usize {
        let hours = max_age_hours.min(MAX_CLEANUP_HOURS) as i64;
        let cutoff = self
            .inner
            .clock
            .now()
            .checked_sub(SignedDuration::from_hours(hours))
            .unwrap_or(Timestamp::MIN);

        let removed = {
            let mut state = self.inner.state.lock().await;
            let mut removed = Vec::new();
            let mut sweep = |map: &mut HashMap<String, BatchTask>| {
                map.retain(|id, task| {
                    let finished_at = task.completed_at.unwrap_or(task.created_at);
                    if finished_at <= cutoff {
                        removed.push(id.clone());
                        false
                    } else {
                        true
                    }
                });
            };
            sweep(&mut state.completed);
            sweep(&mut state.failed);
            removed
        };

        for task_id in &removed {
            if let Err(e) = self.inner.store.remove(task_id).await {
                tracing::warn!(task_id = %task_id, error = %e, "Failed to remove task snapshot");
            }
        }
        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), max_age_hours, "Cleaned up finished tasks");
        }
        removed.len()
    }

    /// Run one processing cycle: drain up to `batch_size` eligible tasks and
    /// dispatch them. Returns the number of tasks dispatched.
    ///
    /// The processing loop calls this on every tick.
    pub async fn process_pending(&self) -> usize {
        let inner = &self.inner;
        let limit = inner
            .config
            .batch_size
            .min(inner.semaphore.available_permits());
        if limit == 0 {
            return 0;
        }

        let shutdown = inner.shutdown_token();
        if shutdown.is_cancelled() {
            return 0;
        }
        let now = inner.clock.now();

        let (ready, dependency_failed) = {
            let mut guard = inner.state.lock().await;
            let state = &mut *guard;
            let completed = &state.completed;
            let failed = &state.failed;
            let drained = state.queues.dequeue_eligible(limit, now, |task| {
                dependency_eligibility(task, completed, failed)
            });

            for task in &drained.failed {
                state.failed.insert(task.task_id.clone(), task.clone());
            }

            let mut ready = Vec::with_capacity(drained.ready.len());
            for task in drained.ready {
                let token = shutdown.child_token();
                ready.push((task.task_id.clone(), token.clone()));
                state
                    .active
                    .insert(task.task_id.clone(), ActiveTask { task, token });
            }
            (ready, drained.failed)
        };

        for task in &dependency_failed {
            tracing::warn!(
                task_id = %task.task_id,
                error = task.error_message.as_deref().unwrap_or_default(),
                "Task failed on dependency"
            );
            inner.persist(task).await;
        }

        let dispatched = ready.len();
        for (task_id, token) in ready {
            match inner.semaphore.clone().acquire_owned().await {
                Ok(permit) => {
                    let worker = Arc::clone(inner);
                    let shutdown = shutdown.clone();
                    inner
                        .tracker
                        .spawn(worker.execute(task_id, token, shutdown, permit));
                }
                Err(_) => inner.release_to_queue(&task_id).await,
            }
        }

        if dispatched > 0 {
            tracing::debug!(dispatched, "Processing cycle dispatched tasks");
        }
        dispatched
    }

    /// Start the processing loop. Does nothing when it is already running.
    pub fn start_processing(&self) {
        let mut lifecycle = self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if lifecycle.loop_handle.is_some() {
            tracing::debug!("Batch processor already running");
            return;
        }

        let interval = Duration::from_millis(self.inner.config.processing_interval_ms.max(1));
        let loop_token = CancellationToken::new();
        let token = loop_token.clone();
        let processor = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                processor.process_pending().await;
            }
        });

        lifecycle.loop_token = Some(loop_token);
        lifecycle.loop_handle = Some(handle);

        tracing::info!(
            interval_ms = self.inner.config.processing_interval_ms,
            batch_size = self.inner.config.batch_size,
            max_concurrent_tasks = self.inner.config.max_concurrent_tasks,
            "Batch processor started"
        );
    }

    /// Stop the loop and wait for in-flight tasks.
    ///
    /// Tasks still running after `shutdown_grace_seconds` are cancelled and
    /// put back in the queue, so a restart with persistence re-runs them.
    pub async fn stop_processing(&self) {
        let (loop_token, handle, shutdown) = {
            let mut lifecycle = self
                .inner
                .lifecycle
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            (
                lifecycle.loop_token.take(),
                lifecycle.loop_handle.take(),
                lifecycle.shutdown.clone(),
            )
        };
        let Some(handle) = handle else {
            return;
        };

        if let Some(token) = loop_token {
            token.cancel();
        }
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Processing loop ended abnormally");
        }

        let tracker = &self.inner.tracker;
        tracker.close();
        let grace = Duration::from_secs(self.inner.config.shutdown_grace_seconds);
        if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
            tracing::warn!(
                in_flight = tracker.len(),
                grace_seconds = self.inner.config.shutdown_grace_seconds,
                "Grace period elapsed, cancelling in-flight tasks"
            );
            shutdown.cancel();
            tracker.wait().await;
        }
        tracker.reopen();

        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shutdown = CancellationToken::new();

        tracing::info!("Batch processor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .lifecycle
            .lock()
            .map(|l| l.loop_handle.is_some())
            .unwrap_or(false)
    }

    /// Rebuild in-memory state from the task store.
    ///
    /// Finished snapshots repopulate the completed and failed sets so
    /// dependencies resolve; unfinished ones are queued again in creation
    /// order. Ids already known are skipped. Returns the number restored.
    pub async fn restore(&self) -> AppResult<usize> {
        let mut snapshots = self.inner.store.load_all().await.map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?;
        snapshots.sort_by_key(|t| t.created_at);

        let mut restored = 0;
        let mut requeued = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            for mut task in snapshots {
                if state.knows(&task.task_id) {
                    continue;
                }
                match task.status {
                    TaskStatus::Completed => {
                        state.completed.insert(task.task_id.clone(), task);
                    }
                    TaskStatus::Failed | TaskStatus::Cancelled => {
                        state.failed.insert(task.task_id.clone(), task);
                    }
                    _ => {
                        task.status = TaskStatus::Queued;
                        task.started_at = None;
                        state.queues.requeue(task.clone());
                        requeued.push(task);
                    }
                }
                restored += 1;
            }
        }

        for task in &requeued {
            self.inner.persist(task).await;
        }
        tracing::info!(
            restored,
            requeued = requeued.len(),
            store = self.inner.store.name(),
            "Restored tasks from store"
        );
        Ok(restored)
    }

    pub async fn stats(&self) -> ProcessorStats {
        let state = self.inner.state.lock().await;
        let queued_by_priority = TaskPriority::SERVICE_ORDER
            .into_iter()
            .map(|p| (p, state.queues.len_of(p)))
            .collect();
        let cancelled = state
            .failed
            .values()
            .filter(|t| t.status == TaskStatus::Cancelled)
            .count();
        let registered_kinds = self.registered_kinds();

        ProcessorStats {
            running: self.is_running(),
            queued: state.queues.len(),
            queued_by_priority,
            active: state.active.len(),
            completed: state.completed.len(),
            failed: state.failed.len() - cancelled,
            cancelled,
            available_slots: self.inner.semaphore.available_permits(),
            registered_kinds,
        }
    }
}

fn dependency_eligibility(
    task: &BatchTask,
    completed: &HashMap<String, BatchTask>,
    failed: &HashMap<String, BatchTask>,
) -> Eligibility {
    if let Some(dep) = task.depends_on.iter().find(|d| failed.contains_key(*d)) {
        return Eligibility::DependencyFailed(dep.clone());
    }
    if task.depends_on.iter().all(|d| completed.contains_key(d)) {
        Eligibility::Ready
    } else {
        Eligibility::Blocked
    }
}

impl Inner {
    fn shutdown_token(&self) -> CancellationToken {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shutdown
            .clone()
    }

    async fn persist(&self, task: &BatchTask) {
        if let Err(e) = self.store.save(task).await {
            tracing::warn!(
                task_id = %task.task_id,
                store = self.store.name(),
                error = %e,
                "Failed to persist task snapshot"
            );
        }
    }

    /// One attempt of a dispatched task. Holds `permit` while the processor runs.
    async fn execute(
        self: Arc<Self>,
        task_id: String,
        token: CancellationToken,
        shutdown: CancellationToken,
        permit: OwnedSemaphorePermit,
    ) {
        let kind = {
            let state = self.state.lock().await;
            let Some(active) = state.active.get(&task_id) else {
                return;
            };
            active.task.kind
        };

        let processor = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind);
        let Some(processor) = processor else {
            drop(permit);
            let message = format!("No processor registered for task kind {}", kind);
            self.finish(&task_id, Finish::Failed(message)).await;
            return;
        };

        let started = {
            let mut state = self.state.lock().await;
            let Some(active) = state.active.get_mut(&task_id) else {
                return;
            };
            active.task.status = TaskStatus::Processing;
            active.task.started_at = Some(self.clock.now());
            active.task.clone()
        };
        self.persist(&started).await;

        let ctx = TaskContext {
            task_id: task_id.clone(),
            attempt: started.retry_count + 1,
            cancellation_token: token.clone(),
        };
        tracing::debug!(
            task_id = %task_id,
            task_kind = %started.kind,
            attempt = ctx.attempt,
            processor = processor.name(),
            "Task processing started"
        );

        let budget = Duration::from_secs(started.timeout_seconds);
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Outcome::Cancelled,
            result = tokio::time::timeout(budget, processor.process(&started.payload, &ctx)) => {
                match result {
                    Ok(Ok(value)) => Outcome::Success(value),
                    Ok(Err(_)) if token.is_cancelled() => Outcome::Cancelled,
                    Ok(Err(e)) => Outcome::Failure(e.to_string()),
                    Err(_) => Outcome::Failure(format!(
                        "Task timed out after {}s",
                        started.timeout_seconds
                    )),
                }
            }
        };
        drop(permit);

        match outcome {
            Outcome::Success(value) => self.finish(&task_id, Finish::Completed(value)).await,
            Outcome::Cancelled => self.settle_cancelled(&task_id, &shutdown).await,
            Outcome::Failure(message) => {
                self.handle_failure(&task_id, message, &token, &shutdown)
                    .await
            }
        }
    }

    async fn handle_failure(
        &self,
        task_id: &str,
        message: String,
        token: &CancellationToken,
        shutdown: &CancellationToken,
    ) {
        let retry_snapshot = {
            let mut state = self.state.lock().await;
            let Some(active) = state.active.get_mut(task_id) else {
                return;
            };
            active.task.retry_count += 1;
            active.task.error_message = Some(message.clone());
            if active.task.can_retry() {
                active.task.status = TaskStatus::Retrying;
                Some(active.task.clone())
            } else {
                None
            }
        };

        let Some(snapshot) = retry_snapshot else {
            self.finish(task_id, Finish::Failed(message)).await;
            return;
        };

        tracing::warn!(
            task_id = %task_id,
            attempt = snapshot.retry_count,
            max_retries = snapshot.max_retries,
            retry_delay_seconds = self.config.retry_delay_seconds,
            error = %message,
            "Task attempt failed, retrying"
        );
        self.persist(&snapshot).await;

        let delay = Duration::from_secs(self.config.retry_delay_seconds);
        tokio::select! {
            biased;
            _ = token.cancelled() => self.settle_cancelled(task_id, shutdown).await,
            _ = tokio::time::sleep(delay) => self.release_to_queue(task_id).await,
        }
    }

    /// A cancelled attempt either ends the task or, when the processor is
    /// shutting down, returns it to the queue.
    async fn settle_cancelled(&self, task_id: &str, shutdown: &CancellationToken) {
        if shutdown.is_cancelled() {
            tracing::info!(task_id = %task_id, "Task interrupted by shutdown, returned to queue");
            self.release_to_queue(task_id).await;
        } else {
            self.finish(task_id, Finish::Cancelled("Task cancelled".to_string()))
                .await;
        }
    }

    async fn release_to_queue(&self, task_id: &str) {
        let task = {
            let mut state = self.state.lock().await;
            let Some(ActiveTask { mut task, .. }) = state.active.remove(task_id) else {
                return;
            };
            task.status = TaskStatus::Queued;
            task.started_at = None;
            state.queues.requeue(task.clone());
            task
        };
        self.persist(&task).await;
    }

    async fn finish(&self, task_id: &str, finish: Finish) {
        let now = self.clock.now();
        let task = {
            let mut state = self.state.lock().await;
            let Some(ActiveTask { mut task, .. }) = state.active.remove(task_id) else {
                return;
            };
            match finish {
                Finish::Completed(value) => {
                    task.mark_completed(value, now);
                    state.completed.insert(task.task_id.clone(), task.clone());
                }
                Finish::Failed(message) => {
                    task.mark_failed(message, now);
                    state.failed.insert(task.task_id.clone(), task.clone());
                }
                Finish::Cancelled(message) => {
                    task.mark_cancelled(message, now);
                    state.failed.insert(task.task_id.clone(), task.clone());
                }
            }
            task
        };

        match task.status {
            TaskStatus::Completed => tracing::info!(
                task_id = %task.task_id,
                task_kind = %task.kind,
                attempts = task.retry_count + 1,
                duration_seconds = task.duration_seconds().unwrap_or_default(),
                "Task completed"
            ),
            TaskStatus::Cancelled => tracing::info!(task_id = %task.task_id, "Task cancelled"),
            _ => tracing::error!(
                task_id = %task.task_id,
                task_kind = %task.kind,
                attempts = task.retry_count.max(1),
                error = task.error_message.as_deref().unwrap_or_default(),
                "Task failed"
            ),
        }
        self.persist(&task).await;
    }
}
