use async_trait::async_trait;

use crate::projects::models::Project;
use atrium_common::error::AtriumResult;

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// The primary reconciliation key: at most one project per external deal id.
    async fn find_by_external_deal_id(&self, external_id: &str)
        -> AtriumResult<Option<Project>>;

    async fn create(&self, project: Project) -> AtriumResult<Project>;

    async fn update(&self, project: Project) -> AtriumResult<Project>;

    /// Highest existing code starting with `code_prefix` (descending
    /// lexicographic scan), used to derive the next sequence number.
    async fn latest_code_with_prefix(&self, code_prefix: &str) -> AtriumResult<Option<String>>;
}
