use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use atrium_common::error::AtriumResult;
use atrium_db::sync::models::{JobStatus, JobTrigger, SyncJob};
use atrium_db::sync::repositories::SyncJobRepository;

use crate::settings::SyncSettings;

/// Priority for operator-triggered runs; scheduled runs enqueue at 0.
pub const MANUAL_PRIORITY: i16 = 10;

/// A recurring-timer job: normal priority, bounded retry with exponential
/// backoff.
pub fn scheduled_job(settings: &SyncSettings) -> SyncJob {
    let now = Utc::now();
    SyncJob {
        id: Uuid::new_v4(),
        trigger: JobTrigger::Scheduled,
        priority: 0,
        status: JobStatus::Queued,
        attempts: 0,
        max_attempts: settings.max_attempts,
        backoff_base_secs: settings.backoff_base_secs,
        run_after: now,
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}

/// An operator-triggered job: higher priority, single attempt. A human is
/// expected to observe the outcome and re-trigger.
pub fn manual_job() -> SyncJob {
    let now = Utc::now();
    SyncJob {
        id: Uuid::new_v4(),
        trigger: JobTrigger::Manual,
        priority: MANUAL_PRIORITY,
        status: JobStatus::Queued,
        attempts: 0,
        max_attempts: 1,
        backoff_base_secs: 0,
        run_after: now,
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}

/// Drop queued scheduled jobs left over from a previous process. Called
/// once at startup before the timer is installed, so restarts never stack
/// duplicate recurring triggers.
pub async fn clear_stale_scheduled<J: SyncJobRepository>(jobs: &J) -> AtriumResult<u64> {
    let cleared = jobs.clear_queued_scheduled().await?;
    if cleared > 0 {
        tracing::info!(cleared, "cleared stale scheduled sync jobs");
    }
    Ok(cleared)
}

/// Enqueue a scheduled job every `interval_minutes`. Returns immediately
/// when the recurring sync is disabled; manual triggers are unaffected.
pub async fn run_recurring_trigger<J: SyncJobRepository>(jobs: J, settings: SyncSettings) {
    if !settings.enabled {
        tracing::info!("recurring sync disabled by configuration");
        return;
    }

    let period = Duration::from_secs(settings.interval_minutes * 60);
    tracing::info!(
        interval_minutes = settings.interval_minutes,
        "recurring sync trigger installed"
    );

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so the cadence
    // starts one interval out.
    interval.tick().await;

    loop {
        interval.tick().await;
        match jobs.enqueue(scheduled_job(&settings)).await {
            Ok(job) => tracing::debug!(job_id = %job.id, "enqueued scheduled sync"),
            Err(e) => tracing::error!(error = %e, "failed to enqueue scheduled sync"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use atrium_db::sync::models::QueueDepth;
    use chrono::DateTime;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MockJobRepo {
        enqueued: Arc<Mutex<Vec<SyncJob>>>,
        cleared: Arc<Mutex<u64>>,
    }

    #[async_trait]
    impl SyncJobRepository for MockJobRepo {
        async fn enqueue(&self, job: SyncJob) -> AtriumResult<SyncJob> {
            self.enqueued.lock().unwrap().push(job.clone());
            Ok(job)
        }

        async fn claim_next(&self) -> AtriumResult<Option<SyncJob>> {
            Ok(None)
        }

        async fn mark_succeeded(&self, _id: Uuid) -> AtriumResult<SyncJob> {
            unreachable!("not used in scheduler tests")
        }

        async fn mark_failed(
            &self,
            _id: Uuid,
            _error: &str,
            _retry_at: Option<DateTime<Utc>>,
        ) -> AtriumResult<SyncJob> {
            unreachable!("not used in scheduler tests")
        }

        async fn depth(&self) -> AtriumResult<QueueDepth> {
            Ok(QueueDepth::default())
        }

        async fn clear_queued_scheduled(&self) -> AtriumResult<u64> {
            *self.cleared.lock().unwrap() += 1;
            Ok(2)
        }
    }

    #[test]
    fn scheduled_job_carries_retry_budget_from_settings() {
        let settings = SyncSettings {
            max_attempts: 5,
            backoff_base_secs: 90,
            ..SyncSettings::default()
        };
        let job = scheduled_job(&settings);
        assert_eq!(job.trigger, JobTrigger::Scheduled);
        assert_eq!(job.priority, 0);
        assert_eq!(job.max_attempts, 5);
        assert_eq!(job.backoff_base_secs, 90);
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn manual_job_has_high_priority_and_no_retry() {
        let job = manual_job();
        assert_eq!(job.trigger, JobTrigger::Manual);
        assert_eq!(job.priority, MANUAL_PRIORITY);
        assert_eq!(job.max_attempts, 1);
    }

    #[tokio::test]
    async fn clear_stale_scheduled_reports_count() {
        let jobs = MockJobRepo::default();
        let cleared = clear_stale_scheduled(&jobs).await.expect("clear");
        assert_eq!(cleared, 2);
        assert_eq!(*jobs.cleared.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn disabled_recurring_trigger_returns_immediately() {
        let jobs = MockJobRepo::default();
        let settings = SyncSettings {
            enabled: false,
            ..SyncSettings::default()
        };
        // Would loop forever if the disabled flag were ignored
        run_recurring_trigger(jobs.clone(), settings).await;
        assert!(jobs.enqueued.lock().unwrap().is_empty());
    }
}
