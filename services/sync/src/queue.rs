use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use atrium_common::error::AtriumResult;
use atrium_db::clients::repositories::ClientRepository;
use atrium_db::people::repositories::PersonRepository;
use atrium_db::projects::repositories::ProjectRepository;
use atrium_db::sync::models::SyncJob;
use atrium_db::sync::repositories::{
    CheckpointRepository, SyncJobRepository, SyncLogRepository,
};

use crate::orchestrator::SyncOrchestrator;

/// Delay before the next attempt: `base * 2^(attempts-1)`, where `attempts`
/// counts the try that just failed. The exponent is capped so the shift can
/// never overflow.
pub fn backoff_delay(base_secs: i64, attempts: i32) -> ChronoDuration {
    let exponent = (attempts - 1).clamp(0, 16) as u32;
    ChronoDuration::seconds(base_secs.saturating_mul(1i64 << exponent))
}

/// Single-slot queue worker: claims due jobs one at a time and hands each
/// to the orchestrator. Running exactly one worker is the concurrency guard
/// the pipeline relies on.
pub struct SyncWorker<J, P, C, R, K, L> {
    jobs: J,
    orchestrator: SyncOrchestrator<P, C, R, K, L>,
}

impl<J, P, C, R, K, L> SyncWorker<J, P, C, R, K, L>
where
    J: SyncJobRepository,
    P: PersonRepository,
    C: ClientRepository,
    R: ProjectRepository,
    K: CheckpointRepository,
    L: SyncLogRepository,
{
    pub fn new(jobs: J, orchestrator: SyncOrchestrator<P, C, R, K, L>) -> Self {
        Self { jobs, orchestrator }
    }

    /// Claim and run queued jobs until nothing is due. Returns the number
    /// of jobs executed.
    pub async fn run_pending(&self) -> AtriumResult<usize> {
        let mut ran = 0;
        while let Some(job) = self.jobs.claim_next().await? {
            self.run_job(job).await?;
            ran += 1;
        }
        Ok(ran)
    }

    pub async fn run_forever(&self, poll_interval: Duration) {
        loop {
            match self.run_pending().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(jobs = n, "drained sync queue"),
                Err(e) => tracing::error!(error = %e, "worker loop error"),
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn run_job(&self, job: SyncJob) -> AtriumResult<()> {
        tracing::info!(
            job_id = %job.id,
            trigger = ?job.trigger,
            attempt = job.attempts,
            "running sync job"
        );

        match self.orchestrator.run(job.trigger).await {
            Ok(summary) => {
                tracing::info!(
                    job_id = %job.id,
                    processed = summary.processed,
                    failed = summary.failed,
                    "sync job finished"
                );
                self.jobs.mark_succeeded(job.id).await?;
            }
            Err(e) => {
                let message = e.to_string();
                let retry_at = if job.attempts < job.max_attempts {
                    let delay = backoff_delay(job.backoff_base_secs, job.attempts);
                    tracing::warn!(
                        job_id = %job.id,
                        attempt = job.attempts,
                        retry_in_secs = delay.num_seconds(),
                        error = %message,
                        "sync job failed, requeueing with backoff"
                    );
                    Some(Utc::now() + delay)
                } else {
                    tracing::error!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        error = %message,
                        "sync job failed permanently"
                    );
                    None
                };
                self.jobs.mark_failed(job.id, &message, retry_at).await?;
            }
        }

        Ok(())
    }
}
