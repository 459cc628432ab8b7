use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::projects::models::{CommercialModel, Project, ProjectStatus};
use crate::projects::repositories::ProjectRepository;
use atrium_common::error::{AtriumError, AtriumResult};

#[derive(Clone)]
pub struct PgProjectRepository {
    pool: PgPool,
}

impl PgProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> AtriumResult<Project> {
        let status_raw: String = row.get("status");
        let status = ProjectStatus::from_str(&status_raw).map_err(AtriumError::Internal)?;
        let model_raw: String = row.get("commercial_model");
        let commercial_model =
            CommercialModel::from_str(&model_raw).map_err(AtriumError::Internal)?;

        Ok(Project {
            id: row.get("id"),
            client_id: row.get("client_id"),
            code: row.get("code"),
            name: row.get("name"),
            status,
            commercial_model,
            amount_minor: row.get("amount_minor"),
            value_owner_id: row.get("value_owner_id"),
            practice_id: row.get("practice_id"),
            notes: row.get("notes"),
            external_deal_id: row.get("external_deal_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ProjectRepository for PgProjectRepository {
    async fn find_by_external_deal_id(
        &self,
        external_id: &str,
    ) -> AtriumResult<Option<Project>> {
        let row = sqlx::query(
            "select id, client_id, code, name, status, commercial_model, amount_minor,
                    value_owner_id, practice_id, notes, external_deal_id, created_at, updated_at
             from projects
             where external_deal_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn create(&self, project: Project) -> AtriumResult<Project> {
        let row = sqlx::query(
            "insert into projects
               (id, client_id, code, name, status, commercial_model, amount_minor,
                value_owner_id, practice_id, notes, external_deal_id, created_at, updated_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
             returning id, client_id, code, name, status, commercial_model, amount_minor,
                       value_owner_id, practice_id, notes, external_deal_id, created_at, updated_at",
        )
        .bind(project.id)
        .bind(project.client_id)
        .bind(&project.code)
        .bind(&project.name)
        .bind(project.status.as_str())
        .bind(project.commercial_model.as_str())
        .bind(project.amount_minor)
        .bind(project.value_owner_id)
        .bind(project.practice_id)
        .bind(&project.notes)
        .bind(&project.external_deal_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn update(&self, project: Project) -> AtriumResult<Project> {
        let row = sqlx::query(
            "update projects
             set client_id = $1, name = $2, status = $3, commercial_model = $4,
                 amount_minor = $5, value_owner_id = $6, practice_id = $7, notes = $8,
                 external_deal_id = $9, updated_at = $10
             where id = $11
             returning id, client_id, code, name, status, commercial_model, amount_minor,
                       value_owner_id, practice_id, notes, external_deal_id, created_at, updated_at",
        )
        .bind(project.client_id)
        .bind(&project.name)
        .bind(project.status.as_str())
        .bind(project.commercial_model.as_str())
        .bind(project.amount_minor)
        .bind(project.value_owner_id)
        .bind(project.practice_id)
        .bind(&project.notes)
        .bind(&project.external_deal_id)
        .bind(Utc::now())
        .bind(project.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn latest_code_with_prefix(&self, code_prefix: &str) -> AtriumResult<Option<String>> {
        // LIKE pattern characters in the prefix are escaped so a literal
        // prefix can never widen the scan.
        let pattern = format!(
            "{}%",
            code_prefix
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_")
        );
        let row = sqlx::query(
            "select code from projects where code like $1 order by code desc limit 1",
        )
        .bind(pattern)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Ok(row.map(|r| r.get("code")))
    }
}
