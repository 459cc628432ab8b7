use std::time::Duration;

use atrium_config::init_tracing;
use atrium_db::clients::pg_repository::PgClientRepository;
use atrium_db::people::pg_repository::PgPersonRepository;
use atrium_db::projects::pg_repository::PgProjectRepository;
use atrium_db::sync::pg_repository::{
    PgCheckpointRepository, PgSyncJobRepository, PgSyncLogRepository,
};

use atrium_sync::crm::client::{CrmClient, CrmClientConfig};
use atrium_sync::orchestrator::SyncOrchestrator;
use atrium_sync::queue::SyncWorker;
use atrium_sync::reconciler::Reconciler;
use atrium_sync::scheduler;
use atrium_sync::settings::SyncSettings;

/// How often the idle worker polls the queue for due jobs.
const WORKER_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    init_tracing("info");
    let _ = dotenvy::dotenv();

    tracing::info!(service = "atrium-sync", "starting");

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = atrium_db::create_pool(&database_url)
        .await
        .expect("failed to connect to database");

    // Fails fast if CRM creds are present but CRM_PIPELINE_ID is missing
    let crm_config = match CrmClientConfig::from_env() {
        Ok(Some(config)) => config,
        Ok(None) => {
            tracing::info!("no CRM credentials found, sync service has nothing to do");
            return;
        }
        Err(e) => {
            panic!("CRM configuration error (fail-fast): {e}");
        }
    };

    let settings = SyncSettings::from_env().expect("invalid sync settings");
    tracing::info!(
        pipeline = %crm_config.pipeline_id,
        interval_minutes = settings.interval_minutes,
        enabled = settings.enabled,
        stage_mappings = settings.stage_map.len(),
        "sync pipeline configured"
    );

    let crm = CrmClient::new(crm_config).expect("failed to create CRM client");

    let people = PgPersonRepository::new(pool.clone());
    let clients = PgClientRepository::new(pool.clone());
    let projects = PgProjectRepository::new(pool.clone());
    let checkpoints = PgCheckpointRepository::new(pool.clone());
    let logs = PgSyncLogRepository::new(pool.clone());
    let jobs = PgSyncJobRepository::new(pool.clone());

    let reconciler = Reconciler::new(people, clients, projects.clone(), settings.clone());
    let orchestrator = SyncOrchestrator::new(crm, reconciler, projects, checkpoints, logs);

    // Clear leftover scheduled registrations before installing the timer,
    // so restarts do not stack duplicate triggers.
    scheduler::clear_stale_scheduled(&jobs)
        .await
        .expect("failed to clear stale scheduled jobs");

    let trigger_jobs = jobs.clone();
    let trigger_settings = settings.clone();
    tokio::spawn(async move {
        scheduler::run_recurring_trigger(trigger_jobs, trigger_settings).await;
    });

    let worker = SyncWorker::new(jobs, orchestrator);

    tokio::select! {
        _ = worker.run_forever(WORKER_POLL_INTERVAL) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
}
