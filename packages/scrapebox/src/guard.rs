//! Job guard: wraps a fallible collection job with failure logging,
//! platform status reporting, and email alerting.
//!
//! ```text
//! JobGuard::run(job)
//!     │
//!     ├─ job succeeds ─► report "ok" ─► JobOutcome::Completed(value)
//!     │
//!     └─ job fails ───► append to logfile
//!                       ─► report "error"
//!                       ─► email the full log
//!                       ─► JobOutcome::Failed(..)
//! ```
//!
//! Job failures never propagate out of [`JobGuard::run`]; they come back
//! as a structured [`JobOutcome::Failed`]. Only the reporting machinery
//! itself (log file I/O, the status call, the alert email) can error.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use crate::alert::{compose_alert, Mailer};
use crate::config::BoxConfig;
use crate::error::{GuardError, GuardResult};
use crate::status::{BoxStatus, StatusApi};

/// Message reported to the platform when a guarded job fails.
const ERROR_STATUS_MESSAGE: &str = "Error collecting data";

/// Structured result of one guarded job run.
#[derive(Debug)]
pub enum JobOutcome<T> {
    /// The job ran to completion; carries its result unchanged
    Completed(T),
    /// The job failed; the failure was logged, reported, and emailed
    Failed(JobFailure),
}

impl<T> JobOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }

    /// The job's result, if it completed.
    pub fn into_value(self) -> Option<T> {
        match self {
            JobOutcome::Completed(value) => Some(value),
            JobOutcome::Failed(_) => None,
        }
    }

    /// The failure details, if the job failed.
    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            JobOutcome::Completed(_) => None,
            JobOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Details captured from a failed run.
#[derive(Debug, Clone)]
pub struct JobFailure {
    pub run_id: Uuid,
    pub job: String,
    /// Top-level error message
    pub message: String,
    /// Full error chain
    pub detail: String,
    pub failed_at: DateTime<Utc>,
}

/// Wraps jobs with failure logging, status reporting, and alerting.
pub struct JobGuard {
    config: BoxConfig,
    status: Arc<dyn StatusApi>,
    mailer: Arc<dyn Mailer>,
}

impl JobGuard {
    pub fn new(config: BoxConfig, status: Arc<dyn StatusApi>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            config,
            status,
            mailer,
        }
    }

    /// Run `job` and report its outcome to the platform.
    ///
    /// On success the job's result comes back unchanged inside
    /// [`JobOutcome::Completed`] and an `ok` status is reported. On failure
    /// the error is appended to the box logfile, an `error` status is
    /// reported, and the full log is emailed to the configured recipient:
    /// exactly one email per failure.
    pub async fn run<T, F, Fut>(&self, name: &str, job: F) -> GuardResult<JobOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        match job().await {
            Ok(value) => {
                self.status.report(BoxStatus::Ok, "").await?;
                info!(job = name, "job completed");
                Ok(JobOutcome::Completed(value))
            }
            Err(err) => {
                let failure = JobFailure {
                    run_id: Uuid::new_v4(),
                    job: name.to_string(),
                    message: err.to_string(),
                    detail: format!("{err:?}"),
                    failed_at: Utc::now(),
                };

                error!(
                    job = name,
                    run_id = %failure.run_id,
                    error = %failure.message,
                    "job failed"
                );

                self.append_log(&failure).await?;
                self.status
                    .report(BoxStatus::Error, ERROR_STATUS_MESSAGE)
                    .await?;

                let log_text = self.read_log().await?;
                self.mailer
                    .send(&compose_alert(&self.config, &log_text))
                    .await?;

                Ok(JobOutcome::Failed(failure))
            }
        }
    }

    async fn append_log(&self, failure: &JobFailure) -> GuardResult<()> {
        let entry = format!(
            "{} ERROR [{}] {}: {}\n{}\n",
            failure.failed_at.to_rfc3339(),
            failure.run_id,
            failure.job,
            failure.message,
            failure.detail,
        );

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.logfile)
            .await
            .map_err(|source| GuardError::Log {
                path: self.config.logfile.clone(),
                source,
            })?;

        file.write_all(entry.as_bytes())
            .await
            .map_err(|source| GuardError::Log {
                path: self.config.logfile.clone(),
                source,
            })
    }

    async fn read_log(&self) -> GuardResult<String> {
        tokio::fs::read_to_string(&self.config.logfile)
            .await
            .map_err(|source| GuardError::Log {
                path: self.config.logfile.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> JobFailure {
        JobFailure {
            run_id: Uuid::new_v4(),
            job: "collect".to_string(),
            message: "boom".to_string(),
            detail: "boom".to_string(),
            failed_at: Utc::now(),
        }
    }

    #[test]
    fn completed_outcome_yields_its_value() {
        let outcome = JobOutcome::Completed(7);
        assert!(outcome.is_completed());
        assert_eq!(outcome.into_value(), Some(7));
    }

    #[test]
    fn failed_outcome_yields_no_value() {
        let outcome: JobOutcome<i32> = JobOutcome::Failed(failure());
        assert!(!outcome.is_completed());
        assert_eq!(outcome.failure().map(|f| f.message.as_str()), Some("boom"));
        assert_eq!(outcome.into_value(), None);
    }
}
