use atrium_db::sync::models::{QueueDepth, SyncCheckpoint, SyncLogEntry};
use atrium_sync::crm::models::CrmPipeline;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    /// None until the first run has created the checkpoint.
    pub checkpoint: Option<SyncCheckpoint>,
    pub recent: Vec<SyncLogEntry>,
    pub queue: QueueDepth,
}

#[derive(Debug, Serialize)]
pub struct SyncLogsResponse {
    pub data: Vec<SyncLogEntry>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SyncHealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SyncPipelinesResponse {
    pub success: bool,
    pub pipelines: Vec<CrmPipeline>,
    pub message: Option<String>,
}
