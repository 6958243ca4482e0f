use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;

use crate::clock::{ManualClock, SharedClock};
use crate::config::settings::{JobOverride, SchedulerConfig};
use crate::error::{AppError, AppResult};
use crate::jobs::executor::ItemOutcome;
use crate::jobs::{
    JobBody, JobConfigUpdate, JobContext, JobRegistry, JobReport, JobStatus, JobType,
    ScheduledJobRunner, Trigger,
};
use crate::services::NotificationService;
use crate::services::notifications::{NotificationMessage, NotificationProvider, NotificationResult};

const RELATIONSHIP_JOB: &str = "daily_relationship_update";

#[derive(Clone, Copy)]
enum Behavior {
    /// Report this many updated items
    Succeed(usize),
    Fail,
    /// Sleep, observing nothing
    Sleep(Duration),
}

struct FakeBody {
    job_type: JobType,
    behavior: Behavior,
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl JobBody for FakeBody {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn run(&self, ctx: &JobContext) -> AppResult<JobReport> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed(items) => {
                ctx.progress.add_total(items);
                for _ in 0..items {
                    ctx.progress.record(ItemOutcome::Updated);
                }
                Ok(JobReport::default().with_summary("items", items))
            }
            Behavior::Fail => Err(AppError::external("airtable", "service unavailable")),
            Behavior::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(JobReport::default())
            }
        }
    }
}

#[derive(Default)]
struct Capture {
    titles: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationProvider for Capture {
    async fn send(&self, message: &NotificationMessage) -> AppResult<NotificationResult> {
        self.titles.lock().unwrap().push(message.title.clone());
        Ok(NotificationResult {
            success: true,
            status_code: Some(204),
            response: None,
            duration_ms: 0,
        })
    }

    fn name(&self) -> &'static str {
        "capture"
    }
}

fn ts(s: &str) -> Timestamp {
    s.parse().unwrap()
}

/// 01:59:30 in Tokyo on 2026-03-10
fn before_window() -> Timestamp {
    ts("2026-03-09T16:59:30Z")
}

struct Harness {
    runner: ScheduledJobRunner,
    clock: ManualClock,
    runs: Arc<AtomicUsize>,
    capture: Arc<Capture>,
}

fn harness_with(behavior: Behavior, config: SchedulerConfig) -> Harness {
    let clock = ManualClock::new(before_window());
    let runs = Arc::new(AtomicUsize::new(0));
    let mut registry = JobRegistry::new();
    for job_type in JobType::ALL {
        registry.register(FakeBody {
            job_type,
            behavior,
            runs: Arc::clone(&runs),
        });
    }
    let capture = Arc::new(Capture::default());
    let notifier = NotificationService::with_providers(vec![capture.clone()]);
    let shared: SharedClock = Arc::new(clock.clone());
    Harness {
        runner: ScheduledJobRunner::new(&config, registry, notifier, shared),
        clock,
        runs,
        capture,
    }
}

fn harness(behavior: Behavior) -> Harness {
    harness_with(behavior, SchedulerConfig::default())
}

async fn settle(runner: &ScheduledJobRunner) {
    for _ in 0..100_000 {
        if runner.get_all_job_statuses().await.active.is_empty() {
            // let fire-and-forget notifications run
            tokio::time::sleep(Duration::from_millis(10)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("runner did not settle");
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_job_fires_once_per_day() {
    let h = harness(Behavior::Succeed(3));

    assert!(h.runner.check_schedule().await.is_empty());

    // poll every second through the whole 02:00 minute
    let window_start = ts("2026-03-09T17:00:00Z");
    let mut started = Vec::new();
    for second in 0..60 {
        h.clock.set(window_start + jiff::SignedDuration::from_secs(second));
        started.extend(h.runner.check_schedule().await);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(started, vec!["daily_relationship_update_20260310_020000"]);
    settle(&h.runner).await;
    assert_eq!(h.runs.load(Ordering::SeqCst), 1);

    // the minute after the window
    h.clock.set(ts("2026-03-09T17:01:00Z"));
    assert!(h.runner.check_schedule().await.is_empty());

    // next day
    h.clock.set(ts("2026-03-10T17:00:10Z"));
    assert_eq!(h.runner.check_schedule().await.len(), 1);
    settle(&h.runner).await;
    assert_eq!(h.runs.load(Ordering::SeqCst), 2);

    let status = h.runner.get_job_status(RELATIONSHIP_JOB).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.trigger, Trigger::Scheduled);
    assert_eq!(status.successful_items, 3);
}

#[tokio::test(start_paused = true)]
async fn test_execution_is_pending_until_its_body_starts() {
    let h = harness(Behavior::Sleep(Duration::from_secs(30)));

    h.runner.trigger_job(RELATIONSHIP_JOB, false).await.unwrap();
    let status = h.runner.get_job_status(RELATIONSHIP_JOB).await.unwrap();
    assert_eq!(status.status, JobStatus::Pending);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let status = h.runner.get_job_status(RELATIONSHIP_JOB).await.unwrap();
    assert_eq!(status.status, JobStatus::Running);

    settle(&h.runner).await;
    let status = h.runner.get_job_status(RELATIONSHIP_JOB).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_is_not_refired_the_same_day() {
    let h = harness(Behavior::Fail);

    h.clock.set(ts("2026-03-09T17:00:00Z"));
    assert_eq!(h.runner.check_schedule().await.len(), 1);
    settle(&h.runner).await;

    let status = h.runner.get_job_status(RELATIONSHIP_JOB).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.error_messages[0].contains("service unavailable"));

    h.clock.set(ts("2026-03-09T17:00:30Z"));
    assert!(h.runner.check_schedule().await.is_empty());
    assert_eq!(h.runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.capture.titles.lock().unwrap().as_slice(),
        ["Daily relationship update failed"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_disabled_job_is_not_scheduled() {
    let h = harness(Behavior::Succeed(1));
    // weekly_quality_assessment runs at 03:00 and is disabled by default
    h.clock.set(ts("2026-03-09T18:00:10Z"));
    assert!(h.runner.check_schedule().await.is_empty());

    // but can still be run by hand
    let id = h
        .runner
        .trigger_job("weekly_quality_assessment", false)
        .await
        .unwrap();
    assert!(id.starts_with("weekly_quality_assessment_20260310_030010"));
}

#[tokio::test(start_paused = true)]
async fn test_trigger_respects_running_guard() {
    let h = harness(Behavior::Sleep(Duration::from_secs(30)));

    let first = h.runner.trigger_job(RELATIONSHIP_JOB, false).await.unwrap();
    let err = h.runner.trigger_job(RELATIONSHIP_JOB, false).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));

    let forced = h.runner.trigger_job(RELATIONSHIP_JOB, true).await.unwrap();
    assert_ne!(first, forced);
    assert_eq!(forced, format!("{}_2", first));
    assert_eq!(h.runner.get_all_job_statuses().await.active.len(), 2);

    settle(&h.runner).await;
    assert_eq!(h.runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_trigger_unknown_job() {
    let h = harness(Behavior::Succeed(1));
    assert!(matches!(
        h.runner.trigger_job("weekly_backup", false).await,
        Err(AppError::NotFound { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_running_job() {
    let h = harness(Behavior::Sleep(Duration::from_secs(3600)));

    h.runner.trigger_job(RELATIONSHIP_JOB, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.runner.cancel_job(RELATIONSHIP_JOB).await);
    settle(&h.runner).await;

    let status = h.runner.get_job_status(RELATIONSHIP_JOB).await.unwrap();
    assert_eq!(status.status, JobStatus::Cancelled);
    assert!(!h.runner.cancel_job(RELATIONSHIP_JOB).await);
    // cancellations do not notify
    assert!(h.capture.titles.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_timeout_fails_execution() {
    let h = harness(Behavior::Sleep(Duration::from_secs(7200)));
    let update = JobConfigUpdate {
        timeout_minutes: Some(1),
        alert_threshold_minutes: Some(30),
        ..JobConfigUpdate::default()
    };
    h.runner
        .update_job_configuration(RELATIONSHIP_JOB, update)
        .await
        .unwrap();

    h.runner.trigger_job(RELATIONSHIP_JOB, false).await.unwrap();
    settle(&h.runner).await;

    let status = h.runner.get_job_status(RELATIONSHIP_JOB).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.error_messages, vec!["Job timed out after 1 minutes"]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_run_raises_alert() {
    let h = harness(Behavior::Sleep(Duration::from_secs(90)));
    let update = JobConfigUpdate {
        alert_threshold_minutes: Some(1),
        notification_on_success: Some(true),
        ..JobConfigUpdate::default()
    };
    h.runner
        .update_job_configuration(RELATIONSHIP_JOB, update)
        .await
        .unwrap();

    h.runner.trigger_job(RELATIONSHIP_JOB, false).await.unwrap();
    settle(&h.runner).await;

    let status = h.runner.get_job_status(RELATIONSHIP_JOB).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert!(status.warnings[0].contains("alert threshold"));

    let mut titles = h.capture.titles.lock().unwrap().clone();
    titles.sort();
    assert_eq!(
        titles,
        vec![
            "Daily relationship update completed",
            "Daily relationship update is running long"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_alert_is_sent_while_run_is_still_going() {
    let h = harness(Behavior::Sleep(Duration::from_secs(3600)));
    let update = JobConfigUpdate {
        timeout_minutes: Some(120),
        alert_threshold_minutes: Some(1),
        ..JobConfigUpdate::default()
    };
    h.runner
        .update_job_configuration(RELATIONSHIP_JOB, update)
        .await
        .unwrap();

    h.runner.trigger_job(RELATIONSHIP_JOB, false).await.unwrap();
    tokio::time::sleep(Duration::from_secs(61)).await;

    let status = h.runner.get_job_status(RELATIONSHIP_JOB).await.unwrap();
    assert_eq!(status.status, JobStatus::Running);
    assert_eq!(
        h.capture.titles.lock().unwrap().as_slice(),
        ["Daily relationship update is running long"]
    );

    assert!(h.runner.cancel_job(RELATIONSHIP_JOB).await);
    settle(&h.runner).await;
    // one alert per run
    assert_eq!(h.capture.titles.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_history_is_purged_after_retention() {
    let h = harness(Behavior::Succeed(1));
    h.runner.trigger_job(RELATIONSHIP_JOB, false).await.unwrap();
    settle(&h.runner).await;
    assert_eq!(h.runner.get_all_job_statuses().await.recent.len(), 1);

    h.clock.advance_secs(29 * 24 * 3600);
    assert_eq!(h.runner.cleanup_history().await, 0);

    h.clock.advance_secs(2 * 24 * 3600);
    assert_eq!(h.runner.cleanup_history().await, 1);
    assert!(h.runner.get_job_status(RELATIONSHIP_JOB).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_rescheduled_job_fires_at_new_time() {
    let h = harness(Behavior::Succeed(1));

    h.clock.set(ts("2026-03-09T17:00:00Z"));
    assert_eq!(h.runner.check_schedule().await.len(), 1);
    settle(&h.runner).await;

    // succeeded today already, moving the time does not re-run it
    let update = JobConfigUpdate {
        schedule_time: Some("02:05".to_string()),
        ..JobConfigUpdate::default()
    };
    let config = h
        .runner
        .update_job_configuration(RELATIONSHIP_JOB, update)
        .await
        .unwrap();
    assert_eq!(config.schedule_time, "02:05");
    h.clock.set(ts("2026-03-09T17:05:00Z"));
    assert!(h.runner.check_schedule().await.is_empty());

    h.clock.set(ts("2026-03-10T17:05:00Z"));
    assert_eq!(h.runner.check_schedule().await.len(), 1);
}

#[tokio::test]
async fn test_update_configuration_errors() {
    let h = harness(Behavior::Succeed(1));
    let bad = JobConfigUpdate {
        schedule_time: Some("2pm".to_string()),
        ..JobConfigUpdate::default()
    };
    assert!(matches!(
        h.runner.update_job_configuration(RELATIONSHIP_JOB, bad).await,
        Err(AppError::Validation { .. })
    ));
    assert!(matches!(
        h.runner
            .update_job_configuration("nope", JobConfigUpdate::default())
            .await,
        Err(AppError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_config_overrides_apply() {
    let config = SchedulerConfig {
        jobs: vec![
            JobOverride {
                job_id: RELATIONSHIP_JOB.to_string(),
                enabled: Some(false),
                batch_size: Some(10),
                ..JobOverride::default()
            },
            JobOverride {
                job_id: "unknown_job".to_string(),
                enabled: Some(true),
                ..JobOverride::default()
            },
        ],
        ..SchedulerConfig::default()
    };
    let h = harness_with(Behavior::Succeed(1), config);

    let job = h.runner.get_job_configuration(RELATIONSHIP_JOB).await.unwrap();
    assert!(!job.enabled);
    assert_eq!(job.batch_size, 10);
    assert_eq!(h.runner.job_configurations().await.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_loop_drives_checks() {
    let h = harness(Behavior::Succeed(1));
    h.clock.set(ts("2026-03-09T17:00:00Z"));

    h.runner.start();
    h.runner.start();
    assert!(h.runner.is_running());
    tokio::time::sleep(Duration::from_secs(1)).await;
    settle(&h.runner).await;
    assert_eq!(h.runs.load(Ordering::SeqCst), 1);

    let status = h.runner.get_all_job_statuses().await;
    assert!(status.scheduler_running);
    let job = status.jobs.iter().find(|j| j.config.job_id == RELATIONSHIP_JOB).unwrap();
    assert_eq!(job.last_success_date, Some(jiff::civil::date(2026, 3, 10)));
    assert_eq!(job.next_run, Some(ts("2026-03-10T17:00:00Z")));

    h.runner.stop().await;
    assert!(!h.runner.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_running_executions() {
    let h = harness(Behavior::Sleep(Duration::from_secs(3600)));
    h.runner.trigger_job(RELATIONSHIP_JOB, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    h.runner.shutdown().await;
    let status = h.runner.get_job_status(RELATIONSHIP_JOB).await.unwrap();
    assert_eq!(status.status, JobStatus::Cancelled);
}
