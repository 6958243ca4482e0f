//! Monitoring commands
//!
//! `status`, `trigger`, `cancel`, `config` and `scheduler` call the HTTP API
//! of a running instance and render the answer for a terminal.

use std::fmt::Write as _;
use std::time::Duration;

use reqwest::{Method, Url};
use serde_json::{Value, json};

use crate::api::dto::ErrorResponse;
use crate::cli::parser::{Commands, ConfigArgs, SchedulerAction};
use crate::error::{AppError, AppResult};
use crate::external::client::build_http_client;
use crate::jobs::JobConfigUpdate;

const SERVICE: &str = "diet-batch api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl From<&ConfigArgs> for JobConfigUpdate {
    fn from(args: &ConfigArgs) -> Self {
        let enabled = match (args.enable, args.disable) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        JobConfigUpdate {
            enabled,
            schedule_time: args.schedule_time.clone(),
            timezone: args.timezone.clone(),
            batch_size: args.batch_size,
            max_concurrent_tasks: args.max_concurrent_tasks,
            timeout_minutes: args.timeout_minutes,
            ..JobConfigUpdate::default()
        }
    }
}

pub struct MonitorCommandHandler {
    http: reqwest::Client,
    base_url: Url,
}

impl MonitorCommandHandler {
    pub fn new(base_url: Url) -> AppResult<Self> {
        if base_url.cannot_be_a_base() {
            return Err(AppError::validation("api_url", "must be an absolute http(s) URL"));
        }
        Ok(Self {
            http: build_http_client(REQUEST_TIMEOUT)?,
            base_url,
        })
    }

    /// Run `command` and return the text to print
    pub async fn execute(&self, command: &Commands) -> AppResult<String> {
        match command {
            Commands::Status { job_id: None } => {
                let status = self.call(Method::GET, &["api", "batch", "jobs"], None).await?;
                Ok(render_overview(&status))
            }
            Commands::Status { job_id: Some(job_id) } => {
                let job = self
                    .call(Method::GET, &["api", "batch", "jobs", job_id.as_str()], None)
                    .await?;
                pretty(&job)
            }
            Commands::Trigger { job_id, force } => {
                let body = json!({ "force_run": force });
                let started = self
                    .call(Method::POST, &["api", "batch", "jobs", job_id.as_str(), "trigger"], Some(body))
                    .await?;
                Ok(format!(
                    "Started {}",
                    started["execution_id"].as_str().unwrap_or("execution")
                ))
            }
            Commands::Cancel { job_id } => {
                let answer = self
                    .call(Method::POST, &["api", "batch", "jobs", job_id.as_str(), "cancel"], None)
                    .await?;
                if answer["cancelled"].as_bool().unwrap_or(false) {
                    Ok(format!("Cancellation requested for {}", job_id))
                } else {
                    Ok(format!("{} has no running execution", job_id))
                }
            }
            Commands::Config(args) => {
                let path = ["api", "batch", "jobs", args.job_id.as_str(), "config"];
                let update = JobConfigUpdate::from(args);
                let config = if update.is_empty() {
                    self.call(Method::GET, &path, None).await?
                } else {
                    self.call(Method::PUT, &path, Some(serde_json::to_value(&update)?))
                        .await?
                };
                pretty(&config)
            }
            Commands::Scheduler { action } => {
                let state = match action {
                    SchedulerAction::Status => {
                        self.call(Method::GET, &["api", "batch", "scheduler"], None).await?
                    }
                    SchedulerAction::Start => {
                        self.call(Method::POST, &["api", "batch", "scheduler", "start"], None)
                            .await?
                    }
                    SchedulerAction::Stop => {
                        self.call(Method::POST, &["api", "batch", "scheduler", "stop"], None)
                            .await?
                    }
                };
                Ok(format!(
                    "Scheduler {} ({} active executions)",
                    if state["running"].as_bool().unwrap_or(false) { "running" } else { "stopped" },
                    state["active_executions"].as_u64().unwrap_or(0)
                ))
            }
            Commands::Serve { .. } => Err(AppError::BadRequest {
                message: "serve is not a monitoring command".to_string(),
            }),
        }
    }

    fn url(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::validation("api_url", "must be an absolute http(s) URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call(&self, method: Method, segments: &[&str], body: Option<Value>) -> AppResult<Value> {
        let url = self.url(segments)?;
        tracing::debug!(%method, %url, "Calling API");

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            if text.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|e| e.message)
            .unwrap_or(text);
        Err(match status.as_u16() {
            400 => AppError::BadRequest { message },
            409 => AppError::Conflict { message },
            _ => AppError::external(SERVICE, format!("{}: {}", status, message)),
        })
    }
}

fn pretty(value: &Value) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap_or("-")
}

/// One line per job followed by active and recent executions
fn render_overview(status: &Value) -> String {
    let mut out = String::new();
    let running = status["scheduler_running"].as_bool().unwrap_or(false);
    let _ = writeln!(out, "Scheduler: {}", if running { "running" } else { "stopped" });
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<28} {:<8} {:<9} {:<8} NEXT RUN",
        "JOB", "ENABLED", "SCHEDULE", "RUNNING"
    );

    for job in status["jobs"].as_array().into_iter().flatten() {
        let _ = writeln!(
            out,
            "{:<28} {:<8} {:<9} {:<8} {}",
            text(job, "job_id"),
            if job["enabled"].as_bool().unwrap_or(false) { "yes" } else { "no" },
            text(job, "schedule_time"),
            if job["running"].as_bool().unwrap_or(false) { "yes" } else { "no" },
            text(job, "next_run"),
        );
    }

    for (title, key) in [("Active", "active"), ("Recent", "recent")] {
        let executions = status[key].as_array().map(Vec::as_slice).unwrap_or_default();
        if executions.is_empty() {
            continue;
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{} executions:", title);
        for execution in executions {
            let _ = writeln!(
                out,
                "  {:<44} {:<10} {}/{} items",
                text(execution, "execution_id"),
                text(execution, "status"),
                execution["processed_items"].as_u64().unwrap_or(0),
                execution["total_items"].as_u64().unwrap_or(0),
            );
        }
    }

    out
}
