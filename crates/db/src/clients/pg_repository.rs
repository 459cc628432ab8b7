use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::clients::models::Client;
use crate::clients::repositories::ClientRepository;
use atrium_common::error::{AtriumError, AtriumResult};

#[derive(Clone)]
pub struct PgClientRepository {
    pool: PgPool,
}

impl PgClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> AtriumResult<Client> {
        Ok(Client {
            id: row.get("id"),
            name: row.get("name"),
            domain: row.get("domain"),
            industry: row.get("industry"),
            external_company_id: row.get("external_company_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ClientRepository for PgClientRepository {
    async fn find_by_external_company_id(
        &self,
        external_id: &str,
    ) -> AtriumResult<Option<Client>> {
        let row = sqlx::query(
            "select id, name, domain, industry, external_company_id, created_at, updated_at
             from clients
             where external_company_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> AtriumResult<Option<Client>> {
        let row = sqlx::query(
            "select id, name, domain, industry, external_company_id, created_at, updated_at
             from clients
             where lower(name) = lower($1)
             limit 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn create(&self, client: Client) -> AtriumResult<Client> {
        let row = sqlx::query(
            "insert into clients (id, name, domain, industry, external_company_id, created_at, updated_at)
             values ($1, $2, $3, $4, $5, $6, $6)
             returning id, name, domain, industry, external_company_id, created_at, updated_at",
        )
        .bind(client.id)
        .bind(&client.name)
        .bind(&client.domain)
        .bind(&client.industry)
        .bind(&client.external_company_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn set_external_company_id(&self, id: Uuid, external_id: &str) -> AtriumResult<Client> {
        let row = sqlx::query(
            "update clients
             set external_company_id = $1, updated_at = $2
             where id = $3
             returning id, name, domain, industry, external_company_id, created_at, updated_at",
        )
        .bind(external_id)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Self::map_row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;

    async fn test_repo() -> Option<(PgClientRepository, PgPool)> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("db should connect");

        sqlx::query(
            "create table if not exists clients (
               id uuid primary key default gen_random_uuid(),
               name text not null,
               domain text,
               industry text,
               external_company_id text,
               created_at timestamptz not null default now(),
               updated_at timestamptz not null default now()
             )",
        )
        .execute(&pool)
        .await
        .ok()?;

        Some((PgClientRepository::new(pool.clone()), pool))
    }

    fn make_client(name: &str, external_company_id: Option<&str>) -> Client {
        Client {
            id: Uuid::new_v4(),
            name: name.to_string(),
            domain: Some("example.com".to_string()),
            industry: Some("Consulting".to_string()),
            external_company_id: external_company_id.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_and_find_by_external_id() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ext = Uuid::new_v4().to_string();
        let created = repo
            .create(make_client("Acme Holdings", Some(&ext)))
            .await
            .expect("create should succeed");

        let found = repo
            .find_by_external_company_id(&ext)
            .await
            .expect("find should succeed")
            .expect("client should exist");
        assert_eq!(found.id, created.id);
        assert_eq!(found.name, "Acme Holdings");
    }

    #[tokio::test]
    async fn find_by_name_is_case_insensitive() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let name = format!("Globex {}", Uuid::new_v4());
        repo.create(make_client(&name, None))
            .await
            .expect("create should succeed");

        let found = repo
            .find_by_name(&name.to_uppercase())
            .await
            .expect("find should succeed");
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn find_missing_returns_none() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let found = repo
            .find_by_external_company_id(&Uuid::new_v4().to_string())
            .await
            .expect("find should succeed");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn backfill_sets_external_id() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let created = repo
            .create(make_client("Initech", None))
            .await
            .expect("create should succeed");
        assert!(created.external_company_id.is_none());

        let ext = Uuid::new_v4().to_string();
        let updated = repo
            .set_external_company_id(created.id, &ext)
            .await
            .expect("backfill should succeed");
        assert_eq!(updated.external_company_id.as_deref(), Some(ext.as_str()));
    }
}
