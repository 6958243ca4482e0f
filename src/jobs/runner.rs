use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use jiff::civil::Date;
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::clock::SharedClock;
use crate::config::settings::SchedulerConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::executor::JobProgress;
use crate::jobs::models::{BatchJobConfig, BatchJobExecution, JobConfigUpdate, default_jobs};
use crate::jobs::registry::JobRegistry;
use crate::jobs::types::{JobContext, JobReport, JobStatus, Trigger};
use crate::services::NotificationService;
use crate::services::notifications::{NotificationLevel, NotificationMessage};

/// History entries returned by [`ScheduledJobRunner::get_all_job_statuses`]
pub const RECENT_HISTORY: usize = 10;

struct ActiveExecution {
    execution: BatchJobExecution,
    token: CancellationToken,
    progress: Arc<JobProgress>,
}

impl ActiveExecution {
    /// The execution with its counters brought up to date
    fn live(&self) -> BatchJobExecution {
        let mut execution = self.execution.clone();
        execution.apply_progress(self.progress.snapshot());
        execution
    }
}

#[derive(Default)]
struct RunnerState {
    configs: BTreeMap<String, BatchJobConfig>,
    /// Keyed by execution id
    active: HashMap<String, ActiveExecution>,
    /// Oldest first
    history: VecDeque<BatchJobExecution>,
    /// Local date each job was last started by the scheduler
    last_fired: HashMap<String, Date>,
    /// Local date of each job's last successful run
    last_success: HashMap<String, Date>,
}

impl RunnerState {
    fn is_running(&self, job_id: &str) -> bool {
        self.active.values().any(|a| a.execution.job_id == job_id)
    }

    fn overview(&self, config: &BatchJobConfig, now: Timestamp) -> JobOverview {
        JobOverview {
            running: self.is_running(&config.job_id),
            next_run: match (config.schedule(), config.time_zone()) {
                (Ok(schedule), Ok(tz)) if config.enabled => schedule.next_after(&tz, now),
                _ => None,
            },
            last_success_date: self.last_success.get(&config.job_id).copied(),
            config: config.clone(),
        }
    }

    fn id_taken(&self, execution_id: &str) -> bool {
        self.active.contains_key(execution_id)
            || self.history.iter().any(|e| e.execution_id == execution_id)
    }

    /// `{job_id}_{YYYYmmdd_HHMMSS}` in the job's timezone, suffixed on collision
    fn execution_id(&self, config: &BatchJobConfig, now: Timestamp) -> String {
        let tz = config.time_zone().unwrap_or(TimeZone::UTC);
        let base = format!(
            "{}_{}",
            config.job_id,
            now.to_zoned(tz).strftime("%Y%m%d_%H%M%S")
        );
        if !self.id_taken(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|id| !self.id_taken(id))
            .unwrap_or(base)
    }

    fn purge_history(&mut self, now: Timestamp, retention: SignedDuration) -> usize {
        let Ok(cutoff) = now.checked_sub(retention) else {
            return 0;
        };
        let before = self.history.len();
        self.history
            .retain(|e| e.completed_at.unwrap_or(e.started_at) >= cutoff);
        before - self.history.len()
    }
}

enum RunOutcome {
    Finished(AppResult<JobReport>),
    TimedOut,
    Cancelled,
}

struct RunnerInner {
    check_interval: Duration,
    retention: SignedDuration,
    registry: JobRegistry,
    notifier: NotificationService,
    clock: SharedClock,
    state: Mutex<RunnerState>,
    tracker: TaskTracker,
    /// Parent of every execution token; cancelled on shutdown
    root: CancellationToken,
    scheduler: StdMutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

/// Job configuration with its schedule state
#[derive(Debug, Clone, Serialize)]
pub struct JobOverview {
    #[serde(flatten)]
    pub config: BatchJobConfig,
    pub running: bool,
    pub next_run: Option<Timestamp>,
    pub last_success_date: Option<Date>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunnerStatus {
    pub scheduler_running: bool,
    pub active: Vec<BatchJobExecution>,
    /// Most recent first
    pub recent: Vec<BatchJobExecution>,
    pub jobs: Vec<JobOverview>,
}

/// Runs the named jobs at their time of day and on demand.
///
/// Cheap to clone; clones share the same jobs and history.
#[derive(Clone)]
pub struct ScheduledJobRunner {
    inner: Arc<RunnerInner>,
}

impl ScheduledJobRunner {
    /// Built-in jobs with the overrides of `config` applied
    pub fn new(
        config: &SchedulerConfig,
        registry: JobRegistry,
        notifier: NotificationService,
        clock: SharedClock,
    ) -> Self {
        let mut configs: BTreeMap<String, BatchJobConfig> = default_jobs(&config.timezone)
            .into_iter()
            .map(|c| (c.job_id.clone(), c))
            .collect();
        for job_override in &config.jobs {
            match configs.get_mut(&job_override.job_id) {
                Some(job) => JobConfigUpdate::from(job_override).apply_to(job),
                None => tracing::warn!(
                    job_id = %job_override.job_id,
                    "Ignoring override for unknown job"
                ),
            }
        }

        Self {
            inner: Arc::new(RunnerInner {
                check_interval: Duration::from_secs(config.check_interval_seconds.max(1)),
                retention: SignedDuration::from_hours(i64::from(config.history_retention_days) * 24),
                registry,
                notifier,
                clock,
                state: Mutex::new(RunnerState {
                    configs,
                    ..RunnerState::default()
                }),
                tracker: TaskTracker::new(),
                root: CancellationToken::new(),
                scheduler: StdMutex::new(None),
            }),
        }
    }

    /// Start every enabled job whose window contains the current time.
    ///
    /// A job fires at most once per local day: not when it already succeeded
    /// today, was already fired today, or is still running. Returns the ids
    /// of the executions started.
    pub async fn check_schedule(&self) -> Vec<String> {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock().await;
        state.purge_history(now, self.inner.retention);

        let due: Vec<(BatchJobConfig, Date)> = state
            .configs
            .values()
            .filter(|c| c.enabled)
            .filter_map(|config| {
                let (schedule, tz) = match (config.schedule(), config.time_zone()) {
                    (Ok(schedule), Ok(tz)) => (schedule, tz),
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::warn!(job_id = %config.job_id, error = %e, "Unschedulable job");
                        return None;
                    }
                };
                let date = schedule.due_date(&tz, now)?;
                let done = state.last_success.get(&config.job_id) == Some(&date)
                    || state.last_fired.get(&config.job_id) == Some(&date)
                    || state.is_running(&config.job_id);
                (!done).then(|| (config.clone(), date))
            })
            .collect();

        let mut started = Vec::with_capacity(due.len());
        for (config, date) in due {
            state.last_fired.insert(config.job_id.clone(), date);
            started.push(self.launch(&mut state, config, Trigger::Scheduled, now));
        }
        started
    }

    /// Run a job now, outside its schedule.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown job id
    /// - `Conflict` when the job is running and `force_run` is false
    pub async fn trigger_job(&self, job_id: &str, force_run: bool) -> AppResult<String> {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock().await;
        let config = state
            .configs
            .get(job_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Job", "job_id", job_id))?;

        if !force_run && state.is_running(job_id) {
            return Err(AppError::Conflict {
                message: format!("Job {} is already running", job_id),
            });
        }
        Ok(self.launch(&mut state, config, Trigger::Manual, now))
    }

    fn launch(
        &self,
        state: &mut RunnerState,
        config: BatchJobConfig,
        trigger: Trigger,
        now: Timestamp,
    ) -> String {
        let execution_id = state.execution_id(&config, now);
        let token = self.inner.root.child_token();
        let progress = Arc::new(JobProgress::default());

        state.active.insert(
            execution_id.clone(),
            ActiveExecution {
                execution: BatchJobExecution::pending(
                    execution_id.clone(),
                    config.clone(),
                    trigger,
                    now,
                ),
                token: token.clone(),
                progress: Arc::clone(&progress),
            },
        );

        tracing::info!(
            job_id = %config.job_id,
            execution_id = %execution_id,
            trigger = trigger.as_str(),
            "Job started"
        );

        let ctx = JobContext {
            execution_id: execution_id.clone(),
            config,
            trigger,
            cancellation_token: token,
            progress,
        };
        let inner = Arc::clone(&self.inner);
        self.inner.tracker.spawn(async move {
            inner.run(ctx).await;
        });
        execution_id
    }

    /// Cancel the running executions of `job_id`. False when none is running.
    pub async fn cancel_job(&self, job_id: &str) -> bool {
        let state = self.inner.state.lock().await;
        let mut cancelled = false;
        for active in state.active.values().filter(|a| a.execution.job_id == job_id) {
            active.token.cancel();
            cancelled = true;
        }
        if cancelled {
            tracing::info!(job_id, "Job cancellation requested");
        }
        cancelled
    }

    /// The running execution of `job_id`, else its most recent finished one
    pub async fn get_job_status(&self, job_id: &str) -> Option<BatchJobExecution> {
        let state = self.inner.state.lock().await;
        if let Some(active) = state
            .active
            .values()
            .filter(|a| a.execution.job_id == job_id)
            .max_by_key(|a| a.execution.started_at)
        {
            return Some(active.live());
        }
        state
            .history
            .iter()
            .rev()
            .find(|e| e.job_id == job_id)
            .cloned()
    }

    pub async fn get_all_job_statuses(&self) -> RunnerStatus {
        let now = self.inner.clock.now();
        let state = self.inner.state.lock().await;

        let mut active: Vec<BatchJobExecution> = state.active.values().map(|a| a.live()).collect();
        active.sort_by_key(|e| e.started_at);

        let jobs = state
            .configs
            .values()
            .map(|config| state.overview(config, now))
            .collect();

        RunnerStatus {
            scheduler_running: self.is_running(),
            active,
            recent: state.history.iter().rev().take(RECENT_HISTORY).cloned().collect(),
            jobs,
        }
    }

    /// Configuration and schedule state of one job
    pub async fn job_overview(&self, job_id: &str) -> Option<JobOverview> {
        let now = self.inner.clock.now();
        let state = self.inner.state.lock().await;
        state.configs.get(job_id).map(|config| state.overview(config, now))
    }

    pub async fn get_job_configuration(&self, job_id: &str) -> Option<BatchJobConfig> {
        self.inner.state.lock().await.configs.get(job_id).cloned()
    }

    pub async fn job_configurations(&self) -> Vec<BatchJobConfig> {
        self.inner.state.lock().await.configs.values().cloned().collect()
    }

    /// Apply `update` to a job. Running executions keep their snapshot.
    ///
    /// Moving the schedule lets the job fire again on the same day.
    pub async fn update_job_configuration(
        &self,
        job_id: &str,
        update: JobConfigUpdate,
    ) -> AppResult<BatchJobConfig> {
        update.check()?;
        let mut state = self.inner.state.lock().await;
        let config = state
            .configs
            .get_mut(job_id)
            .ok_or_else(|| AppError::not_found("Job", "job_id", job_id))?;

        let before = (config.schedule_time.clone(), config.timezone.clone());
        update.apply_to(config);
        let rescheduled = before != (config.schedule_time.clone(), config.timezone.clone());
        let updated = config.clone();
        if rescheduled {
            state.last_fired.remove(job_id);
        }

        tracing::info!(job_id, update = ?update, "Job configuration updated");
        Ok(updated)
    }

    /// Purge history older than the retention window
    pub async fn cleanup_history(&self) -> usize {
        let now = self.inner.clock.now();
        let removed = self
            .inner
            .state
            .lock()
            .await
            .purge_history(now, self.inner.retention);
        if removed > 0 {
            tracing::info!(removed, "Purged job execution history");
        }
        removed
    }

    /// Start the scheduling loop. Calling it while running does nothing.
    pub fn start(&self) {
        let mut scheduler = self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if scheduler.is_some() {
            tracing::debug!("Job scheduler already running");
            return;
        }

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let runner = self.clone();
        let period = self.inner.check_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let started = runner.check_schedule().await;
                        if !started.is_empty() {
                            tracing::debug!(executions = ?started, "Scheduled jobs started");
                        }
                    }
                }
            }
        });

        *scheduler = Some((token, handle));
        tracing::info!(
            check_interval_seconds = period.as_secs(),
            "Job scheduler started"
        );
    }

    /// Stop the scheduling loop; running executions continue.
    pub async fn stop(&self) {
        let running = self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((token, handle)) = running {
            token.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Job scheduler loop ended abnormally");
            }
            tracing::info!("Job scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .scheduler
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    /// Stop scheduling, cancel running executions and wait for them to settle
    pub async fn shutdown(&self) {
        self.stop().await;
        self.inner.root.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl RunnerInner {
    async fn run(self: Arc<Self>, ctx: JobContext) {
        let started = Instant::now();
        if let Some(active) = self.state.lock().await.active.get_mut(&ctx.execution_id) {
            active.execution.mark_running();
        }

        let mut alerted = false;
        let outcome = match self.registry.get(ctx.config.job_type) {
            None => RunOutcome::Finished(Err(AppError::Configuration {
                key: "jobs".to_string(),
                source: anyhow::anyhow!("No job body registered for {}", ctx.config.job_type),
            })),
            Some(body) => {
                let budget = Duration::from_secs(ctx.config.timeout_minutes.saturating_mul(60));
                let run = tokio::time::timeout(budget, body.run(&ctx));
                let alert = tokio::time::sleep(alert_threshold(&ctx.config));
                tokio::pin!(run, alert);
                loop {
                    tokio::select! {
                        biased;
                        _ = ctx.cancellation_token.cancelled() => break RunOutcome::Cancelled,
                        result = &mut run => break match result {
                            Ok(result) => RunOutcome::Finished(result),
                            Err(_) => RunOutcome::TimedOut,
                        },
                        _ = &mut alert, if !alerted => {
                            alerted = true;
                            self.alert_running_long(&ctx).await;
                        }
                    }
                }
            }
        };
        self.finish(ctx, outcome, started.elapsed(), alerted).await;
    }

    /// Warn while the run is still going once it passes its alert threshold
    async fn alert_running_long(&self, ctx: &JobContext) {
        let execution = {
            let mut state = self.state.lock().await;
            let Some(active) = state.active.get_mut(&ctx.execution_id) else {
                return;
            };
            active.execution.apply_progress(ctx.progress.snapshot());
            active.execution.clone()
        };
        tracing::warn!(
            job_id = %execution.job_id,
            execution_id = %execution.execution_id,
            alert_threshold_minutes = ctx.config.alert_threshold_minutes,
            processed = execution.processed_items,
            "Job is running past its alert threshold"
        );
        self.notifier.notify(execution_message(
            &execution,
            NotificationLevel::Warning,
            format!("{} is running long", ctx.config.name),
        ));
    }

    async fn finish(&self, ctx: JobContext, outcome: RunOutcome, elapsed: Duration, alerted: bool) {
        let now = self.clock.now();
        let config = &ctx.config;

        let mut state = self.state.lock().await;
        let Some(active) = state.active.remove(&ctx.execution_id) else {
            tracing::warn!(execution_id = %ctx.execution_id, "Finished execution was not active");
            return;
        };
        let mut execution = active.execution;
        execution.apply_progress(ctx.progress.snapshot());

        let status = match outcome {
            RunOutcome::Finished(Ok(report)) => {
                execution.result_summary = report.summary;
                execution.warnings.extend(report.warnings);
                execution.error_messages.extend(report.errors);
                JobStatus::Completed
            }
            RunOutcome::Cancelled | RunOutcome::Finished(Err(AppError::Cancelled { .. })) => {
                execution.error_messages.push("Job cancelled".to_string());
                JobStatus::Cancelled
            }
            RunOutcome::TimedOut => {
                execution.error_messages.push(format!(
                    "Job timed out after {} minutes",
                    config.timeout_minutes
                ));
                JobStatus::Failed
            }
            RunOutcome::Finished(Err(e)) => {
                execution.error_messages.push(e.to_string());
                JobStatus::Failed
            }
        };

        let slow = alerted || elapsed > alert_threshold(config);
        if slow {
            execution.warnings.push(format!(
                "Run took {:.1} minutes, over the {} minute alert threshold",
                elapsed.as_secs_f64() / 60.0,
                config.alert_threshold_minutes
            ));
        }
        execution.finish(status, now, elapsed.as_secs_f64());

        if status == JobStatus::Completed
            && let Ok(tz) = config.time_zone()
        {
            state
                .last_success
                .insert(config.job_id.clone(), execution.started_at.to_zoned(tz).date());
        }
        state.history.push_back(execution.clone());
        state.purge_history(now, self.retention);
        drop(state);

        match status {
            JobStatus::Completed => tracing::info!(
                job_id = %execution.job_id,
                execution_id = %execution.execution_id,
                processed = execution.processed_items,
                failed = execution.failed_items,
                duration_seconds = elapsed.as_secs_f64(),
                "Job completed"
            ),
            JobStatus::Cancelled => tracing::warn!(
                job_id = %execution.job_id,
                execution_id = %execution.execution_id,
                "Job cancelled"
            ),
            _ => tracing::error!(
                job_id = %execution.job_id,
                execution_id = %execution.execution_id,
                errors = ?execution.error_messages,
                "Job failed"
            ),
        }

        self.notify(&execution, slow && !alerted);
    }

    fn notify(&self, execution: &BatchJobExecution, slow: bool) {
        let config = &execution.job_config;
        if slow {
            self.notifier.notify(execution_message(
                execution,
                NotificationLevel::Warning,
                format!("{} is running long", config.name),
            ));
        }
        match execution.status {
            JobStatus::Completed if config.notification_on_success => {
                self.notifier.notify(execution_message(
                    execution,
                    NotificationLevel::Success,
                    format!("{} completed", config.name),
                ));
            }
            JobStatus::Failed if config.notification_on_failure => {
                self.notifier.notify(execution_message(
                    execution,
                    NotificationLevel::Error,
                    format!("{} failed", config.name),
                ));
            }
            _ => {}
        }
    }
}

fn alert_threshold(config: &BatchJobConfig) -> Duration {
    Duration::from_secs(config.alert_threshold_minutes.saturating_mul(60))
}

fn execution_message(
    execution: &BatchJobExecution,
    level: NotificationLevel,
    title: String,
) -> NotificationMessage {
    let body = match execution.status {
        JobStatus::Completed => format!(
            "Processed {} of {} items: {} updated, {} unchanged, {} failed",
            execution.processed_items,
            execution.total_items,
            execution.successful_items,
            execution.skipped_items,
            execution.failed_items
        ),
        _ => execution
            .error_messages
            .last()
            .cloned()
            .unwrap_or_else(|| execution.status.to_string()),
    };

    NotificationMessage::new(level, title, body)
        .with_field("job_id", &execution.job_id)
        .with_field("execution_id", &execution.execution_id)
        .with_field("trigger", execution.trigger.as_str())
        .with_field(
            "duration",
            format!("{:.1}s", execution.duration_seconds.unwrap_or_default()),
        )
}
