use async_trait::async_trait;
use uuid::Uuid;

use crate::people::models::{Person, Practice};
use atrium_common::error::AtriumResult;

#[async_trait]
pub trait PersonRepository: Send + Sync {
    /// Case-insensitive exact match on email.
    async fn find_by_email(&self, email: &str) -> AtriumResult<Option<Person>>;

    /// The fallback value owner: the longest-tenured active person holding
    /// the partner designation. `None` when no such person exists.
    async fn default_value_owner(&self) -> AtriumResult<Option<Person>>;

    /// All practices marked primary for the person. Attribution requires
    /// exactly one; the caller enforces that.
    async fn primary_practices(&self, person_id: Uuid) -> AtriumResult<Vec<Practice>>;
}
