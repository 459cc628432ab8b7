pub mod crm;
pub mod orchestrator;
pub mod queue;
pub mod reconciler;
pub mod scheduler;
pub mod settings;

use atrium_common::error::AtriumError;
use thiserror::Error;

use crate::crm::client::CrmClientError;

/// Pipeline error, split by blast radius: a fetch-phase failure aborts the
/// whole run, everything else is caught at the per-record boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetch phase failed: {0}")]
    Fetch(CrmClientError),

    #[error("{0}")]
    Record(String),

    #[error(transparent)]
    Store(#[from] AtriumError),
}
