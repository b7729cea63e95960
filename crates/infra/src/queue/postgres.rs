//! Postgres-backed worker repository.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RepositoryError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation on insert) | `23505` | `AlreadyExists` |
//! | Database (other) | Any other | `Storage` |
//! | ColumnDecode / Decode | N/A | `Serialization` |
//! | Other | N/A | `Storage` |
//!
//! Live items live in `workers`, dead-lettered items in `failed_workers`.
//! Fetches are ordered by `created_at, id`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use courier_core::WorkerId;

use super::repository::{RepositoryError, WorkerFilter, WorkerRepository};
use super::types::{FailedWorkItem, WorkItem};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS workers (
        id UUID PRIMARY KEY,
        event_name TEXT NOT NULL,
        payload JSONB NOT NULL,
        queue_name TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0),
        retries INTEGER NOT NULL CHECK (retries >= 0),
        available_at TIMESTAMPTZ NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS workers_queue_created_idx
        ON workers (queue_name, created_at, id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS failed_workers (
        id UUID PRIMARY KEY,
        event_name TEXT NOT NULL,
        payload JSONB NOT NULL,
        queue_name TEXT NOT NULL,
        attempts INTEGER NOT NULL CHECK (attempts >= 0),
        retries INTEGER NOT NULL CHECK (retries >= 0),
        error TEXT NOT NULL,
        failed_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Worker repository storing both queues in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresWorkerRepository {
    pool: Arc<PgPool>,
}

impl PostgresWorkerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect using a database URL.
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `workers` and `failed_workers` tables if missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerRepository for PostgresWorkerRepository {
    #[instrument(skip(self), err)]
    async fn get_workers(&self, filter: &WorkerFilter) -> Result<Vec<WorkItem>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_name, payload, queue_name, attempts, retries,
                   available_at, created_at, updated_at
            FROM workers
            WHERE ($1::TEXT IS NULL OR queue_name = $1)
              AND ($2::TIMESTAMPTZ IS NULL OR available_at IS NULL OR available_at <= $2)
            ORDER BY created_at ASC, id ASC
            LIMIT $3
            "#,
        )
        .bind(filter.queue_name.as_deref())
        .bind(filter.due_at)
        .bind(limit_param(filter.limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_workers", e))?;

        rows.iter()
            .map(|row| {
                WorkItem::try_from(
                    WorkerRow::from_row(row).map_err(|e| map_sqlx_error("get_workers", e))?,
                )
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn get_failed_workers(
        &self,
        filter: &WorkerFilter,
    ) -> Result<Vec<FailedWorkItem>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_name, payload, queue_name, attempts, retries,
                   error, failed_at, created_at, updated_at
            FROM failed_workers
            WHERE ($1::TEXT IS NULL OR queue_name = $1)
            ORDER BY failed_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(filter.queue_name.as_deref())
        .bind(limit_param(filter.limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_failed_workers", e))?;

        rows.iter()
            .map(|row| {
                FailedWorkItem::try_from(
                    FailedWorkerRow::from_row(row).map_err(|e| map_sqlx_error("get_failed_workers", e))?,
                )
            })
            .collect()
    }

    #[instrument(skip(self), fields(worker_id = %id), err)]
    async fn find_worker(&self, id: WorkerId) -> Result<Option<WorkItem>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, event_name, payload, queue_name, attempts, retries,
                   available_at, created_at, updated_at
            FROM workers
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_worker", e))?;

        row.map(|row| {
            WorkItem::try_from(
                WorkerRow::from_row(&row).map_err(|e| map_sqlx_error("find_worker", e))?,
            )
        })
        .transpose()
    }

    #[instrument(skip(self), fields(worker_id = %id), err)]
    async fn find_failed_worker(
        &self,
        id: WorkerId,
    ) -> Result<Option<FailedWorkItem>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, event_name, payload, queue_name, attempts, retries,
                   error, failed_at, created_at, updated_at
            FROM failed_workers
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_failed_worker", e))?;

        row.map(|row| {
            FailedWorkItem::try_from(
                FailedWorkerRow::from_row(&row).map_err(|e| map_sqlx_error("find_failed_worker", e))?,
            )
        })
        .transpose()
    }

    #[instrument(skip(self, item), fields(worker_id = %item.id), err)]
    async fn create_worker(&self, item: &WorkItem) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO workers (
                id, event_name, payload, queue_name, attempts, retries,
                available_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.event_name)
        .bind(&item.payload)
        .bind(&item.queue_name)
        .bind(to_db_count(item.attempts)?)
        .bind(to_db_count(item.retries)?)
        .bind(item.available_at)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_insert_error("create_worker", item.id, e))?;

        Ok(())
    }

    #[instrument(skip(self, item), fields(worker_id = %item.id), err)]
    async fn update_worker(&self, item: &WorkItem) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE workers
            SET event_name = $2,
                payload = $3,
                queue_name = $4,
                attempts = $5,
                retries = $6,
                available_at = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.event_name)
        .bind(&item.payload)
        .bind(&item.queue_name)
        .bind(to_db_count(item.attempts)?)
        .bind(to_db_count(item.retries)?)
        .bind(item.available_at)
        .bind(item.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_worker", e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(item.id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(worker_id = %id), err)]
    async fn delete_worker(&self, id: WorkerId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM workers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_worker", e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self, item), fields(worker_id = %item.id), err)]
    async fn create_failed_worker(&self, item: &FailedWorkItem) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO failed_workers (
                id, event_name, payload, queue_name, attempts, retries,
                error, failed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.event_name)
        .bind(&item.payload)
        .bind(&item.queue_name)
        .bind(to_db_count(item.attempts)?)
        .bind(to_db_count(item.retries)?)
        .bind(&item.error)
        .bind(item.failed_at)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_insert_error("create_failed_worker", item.id, e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(worker_id = %id), err)]
    async fn delete_failed_worker(&self, id: WorkerId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM failed_workers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_failed_worker", e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(())
    }
}

// LIMIT NULL means no limit in Postgres.
fn limit_param(limit: Option<usize>) -> Option<i64> {
    limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX))
}

fn to_db_count(value: u32) -> Result<i32, RepositoryError> {
    i32::try_from(value)
        .map_err(|_| RepositoryError::Serialization(format!("count out of range: {value}")))
}

fn from_db_count(column: &str, value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Serialization(format!("negative {column}: {value}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

fn map_insert_error(operation: &str, id: WorkerId, err: sqlx::Error) -> RepositoryError {
    if is_unique_violation(&err) {
        RepositoryError::AlreadyExists(id)
    } else {
        map_sqlx_error(operation, err)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            RepositoryError::Storage(msg)
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            RepositoryError::Serialization(format!("decode error in {}: {}", operation, err))
        }
        other => RepositoryError::Storage(format!("sqlx error in {}: {}", operation, other)),
    }
}

struct WorkerRow {
    id: Uuid,
    event_name: String,
    payload: serde_json::Value,
    queue_name: String,
    attempts: i32,
    retries: i32,
    available_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for WorkerRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(WorkerRow {
            id: row.try_get("id")?,
            event_name: row.try_get("event_name")?,
            payload: row.try_get("payload")?,
            queue_name: row.try_get("queue_name")?,
            attempts: row.try_get("attempts")?,
            retries: row.try_get("retries")?,
            available_at: row.try_get("available_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<WorkerRow> for WorkItem {
    type Error = RepositoryError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        Ok(WorkItem {
            id: WorkerId::from_uuid(row.id),
            event_name: row.event_name,
            payload: row.payload,
            queue_name: row.queue_name,
            attempts: from_db_count("attempts", row.attempts)?,
            retries: from_db_count("retries", row.retries)?,
            available_at: row.available_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

struct FailedWorkerRow {
    id: Uuid,
    event_name: String,
    payload: serde_json::Value,
    queue_name: String,
    attempts: i32,
    retries: i32,
    error: String,
    failed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for FailedWorkerRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(FailedWorkerRow {
            id: row.try_get("id")?,
            event_name: row.try_get("event_name")?,
            payload: row.try_get("payload")?,
            queue_name: row.try_get("queue_name")?,
            attempts: row.try_get("attempts")?,
            retries: row.try_get("retries")?,
            error: row.try_get("error")?,
            failed_at: row.try_get("failed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<FailedWorkerRow> for FailedWorkItem {
    type Error = RepositoryError;

    fn try_from(row: FailedWorkerRow) -> Result<Self, Self::Error> {
        Ok(FailedWorkItem {
            id: WorkerId::from_uuid(row.id),
            event_name: row.event_name,
            payload: row.payload,
            queue_name: row.queue_name,
            attempts: from_db_count("attempts", row.attempts)?,
            retries: from_db_count("retries", row.retries)?,
            error: row.error,
            failed_at: row.failed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
