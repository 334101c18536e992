//! Submit and poll loops for warehouse-remains report tasks.
//!
//! Submission treats every failure alike and retries on a fixed delay.
//! Polling classifies each download attempt into a [`PollOutcome`]; the
//! outcome's [`Action`] decides whether the loop finishes, stops for good or
//! waits and tries again.

use crate::metrics;
use crate::models::Tenant;
use crate::wb::{DownloadResponse, ReportApi, ReportError};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub submit_attempts: u32,
    pub submit_delay: Duration,
    pub poll_initial_delay: Duration,
    pub poll_attempts: u32,
    pub poll_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            submit_attempts: 3,
            submit_delay: Duration::from_secs(5),
            poll_initial_delay: Duration::from_secs(10),
            poll_attempts: 20,
            poll_delay: Duration::from_secs(10),
        }
    }
}

/// A submitted report task awaiting download.
#[derive(Debug)]
pub struct ReportJob<'a> {
    pub tenant: &'a Tenant,
    pub task_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("no task created after {attempts} attempts")]
    SubmitExhausted { attempts: u32 },
    #[error("token rejected with 401 on poll attempt {attempt}")]
    Unauthorized { attempt: u32 },
    #[error("report not ready after {attempts} poll attempts")]
    NotReady { attempts: u32 },
    #[error("unusable report on poll attempt {attempt}: {detail}")]
    Fatal { attempt: u32, detail: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Success(Value),
    NotReady,
    RateLimited,
    Unauthorized,
    TransientError(String),
    FatalError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Finish,
    Stop,
    Retry,
}

impl PollOutcome {
    pub fn action(&self) -> Action {
        match self {
            PollOutcome::Success(_) => Action::Finish,
            PollOutcome::Unauthorized | PollOutcome::FatalError(_) => Action::Stop,
            PollOutcome::NotReady | PollOutcome::RateLimited | PollOutcome::TransientError(_) => {
                Action::Retry
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PollOutcome::Success(_) => "success",
            PollOutcome::NotReady => "not_ready",
            PollOutcome::RateLimited => "rate_limited",
            PollOutcome::Unauthorized => "unauthorized",
            PollOutcome::TransientError(_) => "transient",
            PollOutcome::FatalError(_) => "fatal",
        }
    }
}

pub fn classify(result: Result<DownloadResponse, ReportError>) -> PollOutcome {
    let response = match result {
        Ok(response) => response,
        Err(err) => return PollOutcome::TransientError(err.to_string()),
    };
    match response.status {
        StatusCode::OK => match serde_json::from_str::<Value>(&response.body) {
            Ok(payload) => PollOutcome::Success(payload),
            Err(err) => PollOutcome::FatalError(format!("undecodable report body: {err}")),
        },
        StatusCode::UNAUTHORIZED => PollOutcome::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => PollOutcome::RateLimited,
        StatusCode::NOT_FOUND => PollOutcome::NotReady,
        other => PollOutcome::TransientError(format!("unexpected HTTP {other}")),
    }
}

pub async fn submit_report<'a, A: ReportApi>(
    api: &A,
    tenant: &'a Tenant,
    policy: &RetryPolicy,
) -> Result<ReportJob<'a>, AcquireError> {
    let attempts = policy.submit_attempts.max(1);
    for attempt in 1..=attempts {
        info!(
            target: "remains.acquire",
            cabinet = %tenant.cabinet_name,
            attempt,
            max = attempts,
            "report_submit_attempt"
        );
        match api.create_report(&tenant.token).await {
            Ok(task_id) => {
                metrics::attempt("submit", "success");
                info!(
                    target: "remains.acquire",
                    cabinet = %tenant.cabinet_name,
                    task = %redact_id(&task_id),
                    "report_task_created"
                );
                return Ok(ReportJob { tenant, task_id });
            }
            Err(err) => {
                metrics::attempt("submit", "failed");
                warn!(
                    target: "remains.acquire",
                    cabinet = %tenant.cabinet_name,
                    attempt,
                    error = %err,
                    "report_submit_failed"
                );
            }
        }
        if attempt < attempts {
            sleep(policy.submit_delay).await;
        }
    }
    Err(AcquireError::SubmitExhausted { attempts })
}

pub async fn await_report<A: ReportApi>(
    api: &A,
    job: &ReportJob<'_>,
    policy: &RetryPolicy,
) -> Result<Value, AcquireError> {
    let cabinet = &job.tenant.cabinet_name;
    let attempts = policy.poll_attempts.max(1);
    sleep(policy.poll_initial_delay).await;

    for attempt in 1..=attempts {
        let outcome = classify(api.download_report(&job.tenant.token, &job.task_id).await);
        metrics::attempt("poll", outcome.label());

        match outcome.action() {
            Action::Finish | Action::Stop => return settle(outcome, cabinet, attempt),
            Action::Retry => match &outcome {
                PollOutcome::TransientError(detail) => warn!(
                    target: "remains.acquire",
                    cabinet = %cabinet,
                    attempt,
                    max = attempts,
                    error = %detail,
                    "report_poll_transient_error"
                ),
                _ => info!(
                    target: "remains.acquire",
                    cabinet = %cabinet,
                    attempt,
                    max = attempts,
                    outcome = outcome.label(),
                    "report_poll_waiting"
                ),
            },
        }

        if attempt < attempts {
            sleep(policy.poll_delay).await;
        }
    }

    warn!(target: "remains.acquire", cabinet = %cabinet, attempts, "report_poll_timed_out");
    Err(AcquireError::NotReady { attempts })
}

fn settle(outcome: PollOutcome, cabinet: &str, attempt: u32) -> Result<Value, AcquireError> {
    match outcome {
        PollOutcome::Success(payload) => {
            info!(target: "remains.acquire", cabinet = %cabinet, attempt, "report_ready");
            Ok(payload)
        }
        PollOutcome::Unauthorized => {
            warn!(target: "remains.acquire", cabinet = %cabinet, attempt, "report_poll_unauthorized");
            Err(AcquireError::Unauthorized { attempt })
        }
        PollOutcome::FatalError(detail) => {
            warn!(target: "remains.acquire", cabinet = %cabinet, attempt, error = %detail, "report_poll_fatal");
            Err(AcquireError::Fatal { attempt, detail })
        }
        other => Err(AcquireError::Fatal {
            attempt,
            detail: format!("{} is not a terminal outcome", other.label()),
        }),
    }
}

fn redact_id(id: &str) -> String {
    if id.chars().count() <= 8 {
        return "***".to_string();
    }
    let head: String = id.chars().take(4).collect();
    let tail: String = id
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{head}...{tail}")
}
