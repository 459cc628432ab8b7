mod error;
mod sync;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;

use atrium_common::types::ServiceInfo;
use atrium_config::{init_tracing, AppConfig};
use atrium_db::sync::pg_repository::{
    PgCheckpointRepository, PgSyncJobRepository, PgSyncLogRepository,
};
use atrium_sync::crm::client::{CrmClient, CrmClientConfig};

#[derive(Clone)]
pub struct AppState {
    pub checkpoints: PgCheckpointRepository,
    pub logs: PgSyncLogRepository,
    pub jobs: PgSyncJobRepository,
    /// None when the CRM is not configured; /sync/pipelines degrades.
    pub crm: Option<CrmClient>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn info() -> Json<ServiceInfo> {
    Json(ServiceInfo::new("atrium-api"))
}

async fn metrics() -> impl IntoResponse {
    let body = "\
# HELP atrium_up Service up indicator\n\
# TYPE atrium_up gauge\n\
atrium_up 1\n\
# HELP atrium_info Service info\n\
# TYPE atrium_info gauge\n\
atrium_info{service=\"atrium-api\",version=\"0.1.0\"} 1\n";

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse::<HeaderValue>().unwrap(),
            "http://127.0.0.1:3000".parse::<HeaderValue>().unwrap(),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/metrics", get(metrics))
        .merge(sync::router())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    init_tracing("info");

    let config = AppConfig::from_env().expect("failed to load config");
    tracing::info!(service = "atrium-api", "starting");

    let pool = atrium_db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");

    // Fails fast if CRM creds are present but CRM_PIPELINE_ID is missing
    let crm = match CrmClientConfig::from_env() {
        Ok(Some(crm_config)) => Some(
            CrmClient::new(crm_config).expect("failed to create CRM client"),
        ),
        Ok(None) => {
            tracing::info!("no CRM credentials found, pipeline discovery disabled");
            None
        }
        Err(e) => {
            panic!("CRM configuration error (fail-fast): {e}");
        }
    };

    let state = AppState {
        checkpoints: PgCheckpointRepository::new(pool.clone()),
        logs: PgSyncLogRepository::new(pool.clone()),
        jobs: PgSyncJobRepository::new(pool),
        crm,
    };

    let app = build_router(state);
    let addr: SocketAddr = config.bind_addr().parse().expect("invalid bind address");

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
