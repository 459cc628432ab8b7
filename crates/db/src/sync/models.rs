use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The persisted watermark for one sync source. Exactly one row exists per
/// source; it advances only when a run completes (success or partial),
/// never on a fetch-phase failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub id: Uuid,
    pub source: String,
    pub last_successful_sync: Option<DateTime<Utc>>,
    pub records_processed: i64,
    pub projects_created: i64,
    pub projects_updated: i64,
    pub clients_created: i64,
    pub failed_imports: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Counter deltas accumulated over one run, added onto the checkpoint totals
/// when the watermark advances.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointDelta {
    pub records_processed: i64,
    pub projects_created: i64,
    pub projects_updated: i64,
    pub clients_created: i64,
    pub failed_imports: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Import,
    Update,
    Manual,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Update => "update",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for SyncType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "import" => Ok(Self::Import),
            "update" => Ok(Self::Update),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("unknown sync type: {value}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
    Partial,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "partial" => Ok(Self::Partial),
            _ => Err(format!("unknown sync status: {value}")),
        }
    }
}

/// Append-only audit row; never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: Uuid,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub external_deal_id: Option<String>,
    pub project_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncLogEntry {
    pub fn new(sync_type: SyncType, status: SyncStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync_type,
            status,
            external_deal_id: None,
            project_id: None,
            client_id: None,
            message: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncLogFilter {
    pub status: Option<SyncStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobTrigger {
    Scheduled,
    Manual,
}

impl JobTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for JobTrigger {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scheduled" => Ok(Self::Scheduled),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("unknown job trigger: {value}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown job status: {value}")),
        }
    }
}

/// A durable queue entry. Claimed with `FOR UPDATE SKIP LOCKED`; delivery is
/// at-least-once, so the pipeline itself must stay idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: Uuid,
    pub trigger: JobTrigger,
    pub priority: i16,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff_base_secs: i64,
    pub run_after: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Live queue depth counters for the status endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueDepth {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}
