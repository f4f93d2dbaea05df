use color_eyre::eyre::{eyre, Result};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use super::store;

/// Schedules the daily purge of observations older than `days`.
///
/// The returned scheduler has to be kept alive for the job to keep firing.
pub async fn start_retention_job(pool: PgPool, days: i64, cron: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|err| eyre!("failed to create job scheduler: {err:?}"))?;

    let job = Job::new_async(cron, move |_id, _scheduler| {
        let pool = pool.clone();
        Box::pin(async move {
            match store::prune_observations(&pool, days).await {
                Ok((weather, aqi)) => info!(
                    "retention: removed {weather} weather rows and {aqi} aqi rows older than {days} days"
                ),
                Err(err) => error!("retention job failed: {err}"),
            }
        })
    })
    .map_err(|err| eyre!("invalid retention schedule `{cron}`: {err:?}"))?;

    scheduler
        .add(job)
        .await
        .map_err(|err| eyre!("failed to add retention job: {err:?}"))?;
    scheduler
        .start()
        .await
        .map_err(|err| eyre!("failed to start job scheduler: {err:?}"))?;

    info!("retention job scheduled ({cron}), keeping {days} days of observations");
    Ok(scheduler)
}
