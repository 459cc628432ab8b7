use chrono::Utc;
use uuid::Uuid;

use atrium_db::clients::repositories::ClientRepository;
use atrium_db::people::repositories::PersonRepository;
use atrium_db::projects::repositories::ProjectRepository;
use atrium_db::sync::models::{
    CheckpointDelta, JobTrigger, SyncLogEntry, SyncStatus, SyncType,
};
use atrium_db::sync::repositories::{CheckpointRepository, SyncLogRepository};

use crate::crm::client::CrmClient;
use crate::crm::models::Deal;
use crate::reconciler::{validate, Reconciler};
use crate::SyncError;

pub const SOURCE_NAME: &str = "crm";

#[derive(Debug, Clone)]
pub struct RecordFailure {
    pub deal_id: String,
    pub deal_name: Option<String>,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub projects_created: usize,
    pub projects_updated: usize,
    pub clients_created: usize,
    pub failed: usize,
    pub failures: Vec<RecordFailure>,
}

impl RunSummary {
    pub fn status(&self) -> SyncStatus {
        if self.failed == 0 {
            SyncStatus::Success
        } else {
            SyncStatus::Partial
        }
    }
}

struct ProcessedDeal {
    project_id: Uuid,
    client_id: Uuid,
    is_update: bool,
    client_created: bool,
}

/// Drives one run: checkpoint read, paginated fetch, sequential per-record
/// processing with an isolating error boundary, checkpoint advance and
/// audit logging. Concurrent runs are not mutually excluded here; the job
/// queue's single worker slot is the only guard.
pub struct SyncOrchestrator<P, C, R, K, L> {
    crm: CrmClient,
    reconciler: Reconciler<P, C, R>,
    projects: R,
    checkpoints: K,
    logs: L,
}

impl<P, C, R, K, L> SyncOrchestrator<P, C, R, K, L>
where
    P: PersonRepository,
    C: ClientRepository,
    R: ProjectRepository,
    K: CheckpointRepository,
    L: SyncLogRepository,
{
    pub fn new(
        crm: CrmClient,
        reconciler: Reconciler<P, C, R>,
        projects: R,
        checkpoints: K,
        logs: L,
    ) -> Self {
        Self {
            crm,
            reconciler,
            projects,
            checkpoints,
            logs,
        }
    }

    pub async fn run(&self, trigger: JobTrigger) -> Result<RunSummary, SyncError> {
        let checkpoint = self.checkpoints.get_or_create(SOURCE_NAME).await?;
        let since = checkpoint.last_successful_sync;

        tracing::info!(?since, ?trigger, "starting sync run");

        // Fetch phase: a failure here aborts the whole run and leaves the
        // checkpoint untouched.
        let deals = match self.crm.search_deals(since).await {
            Ok(deals) => deals,
            Err(e) => {
                let msg = e.to_string();
                tracing::error!(error = %msg, "deal fetch failed, aborting run");
                let mut entry = SyncLogEntry::new(run_sync_type(trigger), SyncStatus::Failed);
                entry.message = Some(format!("fetch phase failed: {msg}"));
                self.append_log_best_effort(entry).await;
                return Err(SyncError::Fetch(e));
            }
        };

        tracing::info!(count = deals.len(), "fetched changed deals");

        let mut summary = RunSummary::default();

        for deal in &deals {
            summary.processed += 1;
            match self.process_deal(deal).await {
                Ok(processed) => {
                    if processed.client_created {
                        summary.clients_created += 1;
                    }
                    let sync_type = if processed.is_update {
                        summary.projects_updated += 1;
                        SyncType::Update
                    } else {
                        summary.projects_created += 1;
                        SyncType::Import
                    };

                    let mut entry = SyncLogEntry::new(sync_type, SyncStatus::Success);
                    entry.external_deal_id = Some(deal.id.clone());
                    entry.project_id = Some(processed.project_id);
                    entry.client_id = Some(processed.client_id);
                    self.append_log_best_effort(entry).await;
                }
                Err(e) => {
                    // The per-record boundary: any failure is recorded and
                    // the run moves on to the next deal.
                    summary.failed += 1;
                    let message = e.to_string();
                    tracing::warn!(deal_id = %deal.id, error = %message, "deal failed to reconcile");
                    summary.failures.push(RecordFailure {
                        deal_id: deal.id.clone(),
                        deal_name: deal.name().map(str::to_string),
                        message: message.clone(),
                    });

                    let mut entry = SyncLogEntry::new(SyncType::Import, SyncStatus::Failed);
                    entry.external_deal_id = Some(deal.id.clone());
                    entry.message = Some(match deal.name() {
                        Some(name) => format!("{name}: {message}"),
                        None => message,
                    });
                    self.append_log_best_effort(entry).await;
                }
            }
        }

        // A partial run still advances the watermark; failed records are
        // retried only when re-touched upstream.
        let delta = CheckpointDelta {
            records_processed: summary.processed as i64,
            projects_created: summary.projects_created as i64,
            projects_updated: summary.projects_updated as i64,
            clients_created: summary.clients_created as i64,
            failed_imports: summary.failed as i64,
        };
        self.checkpoints
            .advance(checkpoint.id, Utc::now(), delta)
            .await?;

        let mut entry = SyncLogEntry::new(run_sync_type(trigger), summary.status());
        entry.message = Some(format!(
            "processed {} deals: {} projects created, {} updated, {} clients created, {} failed",
            summary.processed,
            summary.projects_created,
            summary.projects_updated,
            summary.clients_created,
            summary.failed
        ));
        self.append_log_best_effort(entry).await;

        tracing::info!(
            processed = summary.processed,
            created = summary.projects_created,
            updated = summary.projects_updated,
            failed = summary.failed,
            status = summary.status().as_str(),
            "sync run completed"
        );

        Ok(summary)
    }

    async fn process_deal(&self, deal: &Deal) -> Result<ProcessedDeal, SyncError> {
        let validation = validate(deal);
        if !validation.valid {
            return Err(SyncError::Record(validation.errors.join("; ")));
        }

        let company_id = self
            .crm
            .associated_company_id(&deal.id)
            .await
            .map_err(|e| SyncError::Record(format!("company association lookup failed: {e}")))?
            .ok_or_else(|| {
                SyncError::Record("deal has no associated company; cannot reconcile".to_string())
            })?;

        let company = self
            .crm
            .fetch_company(&company_id)
            .await
            .map_err(|e| SyncError::Record(format!("company lookup failed: {e}")))?;

        let owner = match self
            .crm
            .associated_owner_id(&deal.id)
            .await
            .map_err(|e| SyncError::Record(format!("owner association lookup failed: {e}")))?
        {
            Some(owner_id) => self
                .crm
                .fetch_owner(&owner_id)
                .await
                .map_err(|e| SyncError::Record(format!("owner lookup failed: {e}")))?,
            None => None,
        };

        let existing = self.projects.find_by_external_deal_id(&deal.id).await?;

        let outcome = self
            .reconciler
            .reconcile(deal, &company, owner.as_ref(), existing.as_ref())
            .await?;

        let client_id = outcome.client.client().id;
        let client_created = outcome.client.was_created();
        let is_update = outcome.is_update;

        let project = if is_update {
            self.projects.update(outcome.project).await?
        } else {
            self.projects.create(outcome.project).await?
        };

        Ok(ProcessedDeal {
            project_id: project.id,
            client_id,
            is_update,
            client_created,
        })
    }

    /// Audit writes never block the pipeline; a failed insert only reaches
    /// the operator console.
    async fn append_log_best_effort(&self, entry: SyncLogEntry) {
        if let Err(e) = self.logs.append(entry).await {
            tracing::error!(error = %e, "failed to append sync log entry");
        }
    }
}

/// Run-level summary entries carry the trigger: manual runs log as manual,
/// scheduled runs as import.
fn run_sync_type(trigger: JobTrigger) -> SyncType {
    match trigger {
        JobTrigger::Manual => SyncType::Manual,
        JobTrigger::Scheduled => SyncType::Import,
    }
}
