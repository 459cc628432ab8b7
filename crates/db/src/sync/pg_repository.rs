use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::sync::models::{
    CheckpointDelta, JobStatus, JobTrigger, QueueDepth, SyncCheckpoint, SyncJob, SyncLogEntry,
    SyncLogFilter, SyncStatus, SyncType,
};
use crate::sync::repositories::{CheckpointRepository, SyncJobRepository, SyncLogRepository};
use atrium_common::error::{AtriumError, AtriumResult};

#[derive(Clone)]
pub struct PgCheckpointRepository {
    pool: PgPool,
}

impl PgCheckpointRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> AtriumResult<SyncCheckpoint> {
        Ok(SyncCheckpoint {
            id: row.get("id"),
            source: row.get("source"),
            last_successful_sync: row.get("last_successful_sync"),
            records_processed: row.get("records_processed"),
            projects_created: row.get("projects_created"),
            projects_updated: row.get("projects_updated"),
            clients_created: row.get("clients_created"),
            failed_imports: row.get("failed_imports"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl CheckpointRepository for PgCheckpointRepository {
    async fn get_or_create(&self, source: &str) -> AtriumResult<SyncCheckpoint> {
        let row = sqlx::query(
            "insert into sync_checkpoints (id, source)
             values ($1, $2)
             on conflict (source) do update set updated_at = now()
             returning id, source, last_successful_sync, records_processed, projects_created,
                       projects_updated, clients_created, failed_imports, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(source)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn find(&self, source: &str) -> AtriumResult<Option<SyncCheckpoint>> {
        let row = sqlx::query(
            "select id, source, last_successful_sync, records_processed, projects_created,
                    projects_updated, clients_created, failed_imports, created_at, updated_at
             from sync_checkpoints
             where source = $1",
        )
        .bind(source)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn advance(
        &self,
        id: Uuid,
        synced_at: DateTime<Utc>,
        delta: CheckpointDelta,
    ) -> AtriumResult<SyncCheckpoint> {
        // greatest() keeps the watermark monotonic even if a slow run
        // finishes after a faster, later one.
        let row = sqlx::query(
            "update sync_checkpoints
             set last_successful_sync = greatest(coalesce(last_successful_sync, $1), $1),
                 records_processed = records_processed + $2,
                 projects_created = projects_created + $3,
                 projects_updated = projects_updated + $4,
                 clients_created = clients_created + $5,
                 failed_imports = failed_imports + $6,
                 updated_at = $1
             where id = $7
             returning id, source, last_successful_sync, records_processed, projects_created,
                       projects_updated, clients_created, failed_imports, created_at, updated_at",
        )
        .bind(synced_at)
        .bind(delta.records_processed)
        .bind(delta.projects_created)
        .bind(delta.projects_updated)
        .bind(delta.clients_created)
        .bind(delta.failed_imports)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Self::map_row(row)
    }
}

#[derive(Clone)]
pub struct PgSyncLogRepository {
    pool: PgPool,
}

impl PgSyncLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> AtriumResult<SyncLogEntry> {
        let type_raw: String = row.get("sync_type");
        let sync_type = SyncType::from_str(&type_raw).map_err(AtriumError::Internal)?;
        let status_raw: String = row.get("status");
        let status = SyncStatus::from_str(&status_raw).map_err(AtriumError::Internal)?;

        Ok(SyncLogEntry {
            id: row.get("id"),
            sync_type,
            status,
            external_deal_id: row.get("external_deal_id"),
            project_id: row.get("project_id"),
            client_id: row.get("client_id"),
            message: row.get("message"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl SyncLogRepository for PgSyncLogRepository {
    async fn append(&self, entry: SyncLogEntry) -> AtriumResult<SyncLogEntry> {
        let row = sqlx::query(
            "insert into sync_log_entries
               (id, sync_type, status, external_deal_id, project_id, client_id, message, created_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8)
             returning id, sync_type, status, external_deal_id, project_id, client_id, message, created_at",
        )
        .bind(entry.id)
        .bind(entry.sync_type.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.external_deal_id)
        .bind(entry.project_id)
        .bind(entry.client_id)
        .bind(&entry.message)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn list(&self, filter: SyncLogFilter) -> AtriumResult<Vec<SyncLogEntry>> {
        let limit = filter.limit.unwrap_or(50).clamp(1, 500);
        let rows = match filter.status {
            Some(status) => {
                sqlx::query(
                    "select id, sync_type, status, external_deal_id, project_id, client_id, message, created_at
                     from sync_log_entries
                     where status = $1
                     order by created_at desc
                     limit $2",
                )
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "select id, sync_type, status, external_deal_id, project_id, client_id, message, created_at
                     from sync_log_entries
                     order by created_at desc
                     limit $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }
}

#[derive(Clone)]
pub struct PgSyncJobRepository {
    pool: PgPool,
}

impl PgSyncJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> AtriumResult<SyncJob> {
        let trigger_raw: String = row.get("trigger");
        let trigger = JobTrigger::from_str(&trigger_raw).map_err(AtriumError::Internal)?;
        let status_raw: String = row.get("status");
        let status = JobStatus::from_str(&status_raw).map_err(AtriumError::Internal)?;

        Ok(SyncJob {
            id: row.get("id"),
            trigger,
            priority: row.get("priority"),
            status,
            attempts: row.get("attempts"),
            max_attempts: row.get("max_attempts"),
            backoff_base_secs: row.get("backoff_base_secs"),
            run_after: row.get("run_after"),
            last_error: row.get("last_error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl SyncJobRepository for PgSyncJobRepository {
    async fn enqueue(&self, job: SyncJob) -> AtriumResult<SyncJob> {
        let row = sqlx::query(
            "insert into sync_jobs
               (id, trigger, priority, status, attempts, max_attempts, backoff_base_secs,
                run_after, last_error, created_at, updated_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
             returning id, trigger, priority, status, attempts, max_attempts, backoff_base_secs,
                       run_after, last_error, created_at, updated_at",
        )
        .bind(job.id)
        .bind(job.trigger.as_str())
        .bind(job.priority)
        .bind(job.status.as_str())
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.backoff_base_secs)
        .bind(job.run_after)
        .bind(&job.last_error)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn claim_next(&self) -> AtriumResult<Option<SyncJob>> {
        let row = sqlx::query(
            "update sync_jobs
             set status = 'running', attempts = attempts + 1, updated_at = $1
             where id = (
               select id from sync_jobs
               where status = 'queued' and run_after <= $1
               order by priority desc, run_after asc
               for update skip locked
               limit 1
             )
             returning id, trigger, priority, status, attempts, max_attempts, backoff_base_secs,
                       run_after, last_error, created_at, updated_at",
        )
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::map_row(r)?)),
            None => Ok(None),
        }
    }

    async fn mark_succeeded(&self, id: Uuid) -> AtriumResult<SyncJob> {
        let row = sqlx::query(
            "update sync_jobs
             set status = 'succeeded', last_error = null, updated_at = $1
             where id = $2
             returning id, trigger, priority, status, attempts, max_attempts, backoff_base_secs,
                       run_after, last_error, created_at, updated_at",
        )
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> AtriumResult<SyncJob> {
        let row = match retry_at {
            Some(at) => {
                sqlx::query(
                    "update sync_jobs
                     set status = 'queued', last_error = $1, run_after = $2, updated_at = $3
                     where id = $4
                     returning id, trigger, priority, status, attempts, max_attempts, backoff_base_secs,
                               run_after, last_error, created_at, updated_at",
                )
                .bind(error)
                .bind(at)
                .bind(Utc::now())
                .bind(id)
                .fetch_one(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "update sync_jobs
                     set status = 'failed', last_error = $1, updated_at = $2
                     where id = $3
                     returning id, trigger, priority, status, attempts, max_attempts, backoff_base_secs,
                               run_after, last_error, created_at, updated_at",
                )
                .bind(error)
                .bind(Utc::now())
                .bind(id)
                .fetch_one(&self.pool)
                .await
            }
        }
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn depth(&self) -> AtriumResult<QueueDepth> {
        let row = sqlx::query(
            "select
               count(*) filter (where status = 'queued') as waiting,
               count(*) filter (where status = 'running') as active,
               count(*) filter (where status = 'succeeded') as completed,
               count(*) filter (where status = 'failed') as failed
             from sync_jobs",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Ok(QueueDepth {
            waiting: row.get("waiting"),
            active: row.get("active"),
            completed: row.get("completed"),
            failed: row.get("failed"),
        })
    }

    async fn clear_queued_scheduled(&self) -> AtriumResult<u64> {
        let result = sqlx::query(
            "delete from sync_jobs where status = 'queued' and trigger = 'scheduled'",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
