use std::str::FromStr;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use atrium_common::error::AtriumError;
use atrium_db::sync::models::{SyncLogFilter, SyncStatus};
use atrium_db::sync::repositories::{CheckpointRepository, SyncJobRepository, SyncLogRepository};
use atrium_sync::orchestrator::SOURCE_NAME;
use atrium_sync::scheduler;

use crate::error::ApiError;
use crate::sync::responses::{
    SyncHealthResponse, SyncLogsResponse, SyncPipelinesResponse, SyncStatusResponse,
    TriggerResponse,
};
use crate::AppState;

/// Enqueue a manual run. Enqueue failures are reported in the body with
/// `success: false`, not as a 5xx, so operator tooling always gets a
/// structured answer.
pub async fn trigger_sync(State(state): State<AppState>) -> Json<TriggerResponse> {
    match state.jobs.enqueue(scheduler::manual_job()).await {
        Ok(job) => Json(TriggerResponse {
            success: true,
            message: "sync job enqueued".to_string(),
            job_id: Some(job.id),
        }),
        Err(e) => {
            tracing::error!(error = %e, "failed to enqueue manual sync");
            Json(TriggerResponse {
                success: false,
                message: format!("failed to enqueue sync job: {e}"),
                job_id: None,
            })
        }
    }
}

pub async fn sync_status(
    State(state): State<AppState>,
) -> Result<Json<SyncStatusResponse>, ApiError> {
    let checkpoint = state.checkpoints.find(SOURCE_NAME).await?;
    let recent = state
        .logs
        .list(SyncLogFilter {
            status: None,
            limit: Some(10),
        })
        .await?;
    let queue = state.jobs.depth().await?;

    Ok(Json(SyncStatusResponse {
        checkpoint,
        recent,
        queue,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SyncLogsQuery {
    pub limit: Option<i64>,
    pub status: Option<String>,
}

pub async fn sync_logs(
    State(state): State<AppState>,
    Query(query): Query<SyncLogsQuery>,
) -> Result<Json<SyncLogsResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(SyncStatus::from_str)
        .transpose()
        .map_err(AtriumError::Validation)?;

    let data = state
        .logs
        .list(SyncLogFilter {
            status,
            limit: query.limit,
        })
        .await?;
    let count = data.len();

    Ok(Json(SyncLogsResponse { data, count }))
}

/// Health is derived from queue reachability: if the jobs table answers, the
/// pipeline can accept work.
pub async fn sync_health(State(state): State<AppState>) -> Json<SyncHealthResponse> {
    match state.jobs.depth().await {
        Ok(_) => Json(SyncHealthResponse { status: "healthy" }),
        Err(e) => {
            tracing::error!(error = %e, "sync queue unreachable");
            Json(SyncHealthResponse {
                status: "unhealthy",
            })
        }
    }
}

/// Configuration discovery: list the source's pipelines and stages. Not part
/// of the sync algorithm; failures come back as a structured body.
pub async fn sync_pipelines(State(state): State<AppState>) -> Json<SyncPipelinesResponse> {
    let Some(crm) = &state.crm else {
        return Json(SyncPipelinesResponse {
            success: false,
            pipelines: Vec::new(),
            message: Some("CRM is not configured".to_string()),
        });
    };

    match crm.list_pipelines().await {
        Ok(pipelines) => Json(SyncPipelinesResponse {
            success: true,
            pipelines,
            message: None,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "pipeline discovery failed");
            Json(SyncPipelinesResponse {
                success: false,
                pipelines: Vec::new(),
                message: Some(e.to_string()),
            })
        }
    }
}
