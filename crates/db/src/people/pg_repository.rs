use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::people::models::{Person, Practice};
use crate::people::repositories::PersonRepository;
use atrium_common::error::{AtriumError, AtriumResult};

#[derive(Clone)]
pub struct PgPersonRepository {
    pool: PgPool,
}

impl PgPersonRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> AtriumResult<Person> {
        Ok(Person {
            id: row.get("id"),
            display_name: row.get("display_name"),
            email: row.get("email"),
            designation: row.get("designation"),
            hired_at: row.get("hired_at"),
            status: row.get("status"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl PersonRepository for PgPersonRepository {
    async fn find_by_email(&self, email: &str) -> AtriumResult<Option<Person>> {
        let row = sqlx::query(
            "select id, display_name, email, designation, hired_at, status, created_at, updated_at
             from people
             where lower(email) = lower($1)
             limit 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn default_value_owner(&self) -> AtriumResult<Option<Person>> {
        let row = sqlx::query(
            "select id, display_name, email, designation, hired_at, status, created_at, updated_at
             from people
             where status = 'active' and designation = 'partner'
             order by hired_at asc nulls last
             limit 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn primary_practices(&self, person_id: Uuid) -> AtriumResult<Vec<Practice>> {
        let rows = sqlx::query(
            "select p.id, p.name
             from practices p
             join person_practices pp on pp.practice_id = p.id
             where pp.person_id = $1 and pp.is_primary",
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| Practice {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;
    use chrono::NaiveDate;

    async fn test_repo() -> Option<(PgPersonRepository, PgPool)> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("db should connect");

        sqlx::query(
            "create table if not exists people (
               id uuid primary key default gen_random_uuid(),
               display_name text not null,
               email text,
               designation text,
               hired_at date,
               status text not null default 'active',
               created_at timestamptz not null default now(),
               updated_at timestamptz not null default now()
             )",
        )
        .execute(&pool)
        .await
        .ok()?;

        sqlx::query(
            "create table if not exists practices (
               id uuid primary key default gen_random_uuid(),
               name text not null,
               created_at timestamptz not null default now()
             )",
        )
        .execute(&pool)
        .await
        .ok()?;

        sqlx::query(
            "create table if not exists person_practices (
               person_id uuid not null,
               practice_id uuid not null,
               is_primary boolean not null default false,
               primary key (person_id, practice_id)
             )",
        )
        .execute(&pool)
        .await
        .ok()?;

        Some((PgPersonRepository::new(pool.clone()), pool))
    }

    async fn insert_person(
        pool: &PgPool,
        email: &str,
        designation: &str,
        hired_at: NaiveDate,
        status: &str,
    ) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "insert into people (id, display_name, email, designation, hired_at, status)
             values ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind("Test Person")
        .bind(email)
        .bind(designation)
        .bind(hired_at)
        .bind(status)
        .execute(pool)
        .await
        .expect("insert person");
        id
    }

    async fn insert_practice(pool: &PgPool, person_id: Uuid, is_primary: bool) -> Uuid {
        let practice_id = Uuid::new_v4();
        sqlx::query("insert into practices (id, name) values ($1, $2)")
            .bind(practice_id)
            .bind(format!("practice-{practice_id}"))
            .execute(pool)
            .await
            .expect("insert practice");
        sqlx::query(
            "insert into person_practices (person_id, practice_id, is_primary) values ($1, $2, $3)",
        )
        .bind(person_id)
        .bind(practice_id)
        .bind(is_primary)
        .execute(pool)
        .await
        .expect("insert person practice");
        practice_id
    }

    #[tokio::test]
    async fn find_by_email_ignores_case() {
        let (repo, pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let email = format!("{}@example.com", Uuid::new_v4());
        let id = insert_person(
            &pool,
            &email,
            "consultant",
            NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
            "active",
        )
        .await;

        let found = repo
            .find_by_email(&email.to_uppercase())
            .await
            .expect("find should succeed")
            .expect("person should exist");
        assert_eq!(found.id, id);
    }

    // Partner tests share the people table, so they serialize on a lock and
    // clear prior partners first.
    static PARTNER_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    #[tokio::test]
    async fn default_value_owner_prefers_longest_tenure() {
        let _guard = PARTNER_LOCK.lock().await;
        let (repo, pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        sqlx::query("delete from people where designation = 'partner'")
            .execute(&pool)
            .await
            .expect("cleanup");

        let senior = insert_person(
            &pool,
            &format!("{}@example.com", Uuid::new_v4()),
            "partner",
            NaiveDate::from_ymd_opt(2015, 1, 10).unwrap(),
            "active",
        )
        .await;
        insert_person(
            &pool,
            &format!("{}@example.com", Uuid::new_v4()),
            "partner",
            NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
            "active",
        )
        .await;

        let owner = repo
            .default_value_owner()
            .await
            .expect("query should succeed")
            .expect("a partner should exist");
        assert_eq!(owner.id, senior);
    }

    #[tokio::test]
    async fn default_value_owner_skips_inactive_partners() {
        let _guard = PARTNER_LOCK.lock().await;
        let (repo, pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        sqlx::query("delete from people where designation = 'partner'")
            .execute(&pool)
            .await
            .expect("cleanup");

        insert_person(
            &pool,
            &format!("{}@example.com", Uuid::new_v4()),
            "partner",
            NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
            "inactive",
        )
        .await;

        let owner = repo
            .default_value_owner()
            .await
            .expect("query should succeed");
        assert!(owner.is_none());
    }

    #[tokio::test]
    async fn primary_practices_filters_non_primary() {
        let (repo, pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let person = insert_person(
            &pool,
            &format!("{}@example.com", Uuid::new_v4()),
            "consultant",
            NaiveDate::from_ymd_opt(2019, 9, 15).unwrap(),
            "active",
        )
        .await;
        let primary = insert_practice(&pool, person, true).await;
        insert_practice(&pool, person, false).await;

        let practices = repo
            .primary_practices(person)
            .await
            .expect("query should succeed");
        assert_eq!(practices.len(), 1);
        assert_eq!(practices[0].id, primary);
    }
}
