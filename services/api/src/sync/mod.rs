pub mod handlers;
pub mod responses;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync/trigger", post(handlers::trigger_sync))
        .route("/sync/status", get(handlers::sync_status))
        .route("/sync/logs", get(handlers::sync_logs))
        .route("/sync/health", get(handlers::sync_health))
        .route("/sync/pipelines", get(handlers::sync_pipelines))
}
