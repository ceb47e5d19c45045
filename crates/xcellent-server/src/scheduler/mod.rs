//! Background job scheduler.
//!
//! Registers the snapshot jobs: one poll followed by a backfill shortly after
//! startup, then a poll on a fixed interval. A tick that lands while a poll or
//! backfill is still running is skipped by the service, never queued.

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use xcellent_core::AppConfig;
use xcellent_engine::{Outcome, SnapshotService};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process; dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    service: SnapshotService,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    if service.is_configured() {
        register_startup_job(&scheduler, service.clone(), config.poll_startup_delay_secs).await?;
        register_poll_job(&scheduler, service, config.poll_interval_secs).await?;
    } else {
        tracing::warn!("scheduler: metrics source not configured; snapshot jobs not registered");
    }

    scheduler.start().await?;
    Ok(scheduler)
}

/// One poll, then one backfill, after the startup delay.
async fn register_startup_job(
    scheduler: &JobScheduler,
    service: SnapshotService,
    delay_secs: u64,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_one_shot_async(Duration::from_secs(delay_secs), move |_uuid, _lock| {
        let service = service.clone();

        Box::pin(async move {
            tracing::info!("scheduler: starting startup poll");
            run_poll(&service).await;
            run_backfill(&service).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(delay_secs, "scheduler: startup poll registered");
    Ok(())
}

async fn register_poll_job(
    scheduler: &JobScheduler,
    service: SnapshotService,
    interval_secs: u64,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_repeated_async(Duration::from_secs(interval_secs), move |_uuid, _lock| {
        let service = service.clone();

        Box::pin(async move {
            tracing::info!("scheduler: starting interval poll");
            run_poll(&service).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(interval_secs, "scheduler: interval poll registered");
    Ok(())
}

/// Poll and log the result; failures wait for the next tick.
async fn run_poll(service: &SnapshotService) {
    match service.poll().await {
        Ok(Outcome::Completed(report)) => {
            tracing::info!(
                date = %report.date,
                items = report.items_polled,
                delta_impressions = report.aggregate.delta.impressions,
                "scheduler: poll complete"
            );
        }
        Ok(Outcome::Skipped { reason }) => {
            tracing::info!(%reason, "scheduler: poll skipped");
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: poll failed");
        }
    }
}

async fn run_backfill(service: &SnapshotService) {
    match service.backfill().await {
        Ok(Outcome::Completed(report)) => {
            tracing::info!(
                filled = report.filled_dates.len(),
                missing = report.missing_dates.len(),
                "scheduler: backfill complete"
            );
        }
        Ok(Outcome::Skipped { reason }) => {
            tracing::info!(%reason, "scheduler: backfill skipped");
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: backfill failed");
        }
    }
}
