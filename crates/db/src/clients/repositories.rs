use async_trait::async_trait;
use uuid::Uuid;

use crate::clients::models::Client;
use atrium_common::error::AtriumResult;

#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Exact match on the external CRM company id.
    async fn find_by_external_company_id(&self, external_id: &str)
        -> AtriumResult<Option<Client>>;

    /// Case-insensitive exact match on the client name.
    async fn find_by_name(&self, name: &str) -> AtriumResult<Option<Client>>;

    async fn create(&self, client: Client) -> AtriumResult<Client>;

    /// Backfill the external company id onto an existing client so future
    /// runs match on the fast path.
    async fn set_external_company_id(&self, id: Uuid, external_id: &str) -> AtriumResult<Client>;
}
