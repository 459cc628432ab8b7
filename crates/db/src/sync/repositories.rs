use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::sync::models::{
    CheckpointDelta, QueueDepth, SyncCheckpoint, SyncJob, SyncLogEntry, SyncLogFilter,
};
use atrium_common::error::AtriumResult;

#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Get or lazily create the checkpoint row for a source.
    async fn get_or_create(&self, source: &str) -> AtriumResult<SyncCheckpoint>;

    /// Read without creating; `None` before the first run.
    async fn find(&self, source: &str) -> AtriumResult<Option<SyncCheckpoint>>;

    /// Advance the watermark and add the run's counter deltas. Called only
    /// after a completed (success or partial) run.
    async fn advance(
        &self,
        id: Uuid,
        synced_at: DateTime<Utc>,
        delta: CheckpointDelta,
    ) -> AtriumResult<SyncCheckpoint>;
}

#[async_trait]
pub trait SyncLogRepository: Send + Sync {
    /// Append one audit row. Entries are never mutated afterwards.
    async fn append(&self, entry: SyncLogEntry) -> AtriumResult<SyncLogEntry>;

    /// Most recent entries first, optionally filtered by status.
    async fn list(&self, filter: SyncLogFilter) -> AtriumResult<Vec<SyncLogEntry>>;
}

#[async_trait]
pub trait SyncJobRepository: Send + Sync {
    async fn enqueue(&self, job: SyncJob) -> AtriumResult<SyncJob>;

    /// Claim the next due job (highest priority, oldest run_after) and mark
    /// it running, incrementing its attempt counter. Uses
    /// `FOR UPDATE SKIP LOCKED` so concurrent workers never double-claim.
    async fn claim_next(&self) -> AtriumResult<Option<SyncJob>>;

    async fn mark_succeeded(&self, id: Uuid) -> AtriumResult<SyncJob>;

    /// Record a failure. With `retry_at` set the job is requeued for that
    /// time; without it the job is parked as failed.
    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> AtriumResult<SyncJob>;

    async fn depth(&self) -> AtriumResult<QueueDepth>;

    /// Remove queued scheduled jobs left over from a previous process, so a
    /// restart does not stack duplicate timers.
    async fn clear_queued_scheduled(&self) -> AtriumResult<u64>;
}
