//! Entry point for running a collection job now and keeping it on a daily
//! schedule.
//!
//! The scheduling itself is delegated to `tokio-cron-scheduler`; this
//! module only composes the immediate run, the guard wrapping, and the
//! daily registration.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, Timelike};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::BoxConfig;
use crate::guard::JobGuard;

/// Interval between liveness ticks once the schedule is running.
const TICK: Duration = Duration::from_secs(1);

/// Run `job` once now and, if `schedule` is set, keep running it daily at
/// `config.schedule_at`.
///
/// The guard only wraps the job when it is being scheduled; a one-shot
/// run fails loudly instead of emailing. When scheduling, this function
/// never returns: after the immediate run it registers the cron job and
/// parks, ticking at a fixed interval until the process is terminated.
pub async fn run_or_schedule<F, Fut>(
    name: &str,
    job: F,
    schedule: bool,
    guard: Option<Arc<JobGuard>>,
    config: &BoxConfig,
) -> anyhow::Result<()>
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let guard = if schedule { guard } else { None };

    run_once(name, &job, guard.as_deref()).await?;

    if !schedule {
        return Ok(());
    }

    let scheduler = JobScheduler::new().await?;
    let cron = cron_expr(config.schedule_at);

    let cron_name = name.to_string();
    let cron_job = job.clone();
    let cron_guard = guard.clone();
    let scheduled = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let name = cron_name.clone();
        let job = cron_job.clone();
        let guard = cron_guard.clone();
        Box::pin(async move {
            if let Err(e) = run_once(&name, &job, guard.as_deref()).await {
                error!(job = %name, error = %e, "scheduled run failed");
            }
        })
    })?;

    scheduler.add(scheduled).await?;
    scheduler.start().await?;
    info!(job = name, schedule = %cron, "daily schedule started");

    loop {
        tokio::time::sleep(TICK).await;
    }
}

async fn run_once<F, Fut>(name: &str, job: &F, guard: Option<&JobGuard>) -> anyhow::Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    match guard {
        Some(guard) => {
            guard.run(name, job).await?;
            Ok(())
        }
        None => job().await,
    }
}

/// Six-field cron expression firing once daily at `at`.
fn cron_expr(at: NaiveTime) -> String {
    format!("0 {} {} * * *", at.minute(), at.hour())
}
