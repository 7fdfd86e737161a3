//! [`Ledger`] on `PostgreSQL`.
//!
//! Reservation is `INSERT ... ON CONFLICT DO NOTHING` against the primary key,
//! so the uniqueness constraint decides the winner even when several service
//! instances share the table.

use async_trait::async_trait;
use cartline_core::RequestId;
use sqlx::PgPool;

use crate::storage::ledger::{IdempotencyRecord, Ledger};

pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the ledger table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS idempotency_records (
                request_id    TEXT PRIMARY KEY,
                operation     TEXT NOT NULL,
                created_at_ms BIGINT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for PostgresLedger {
    async fn insert_if_absent(&self, record: &IdempotencyRecord) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO idempotency_records (request_id, operation, created_at_ms)
             VALUES ($1, $2, $3)
             ON CONFLICT (request_id) DO NOTHING",
        )
        .bind(record.request_id.as_str())
        .bind(record.operation.as_str())
        .bind(record.created_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn exists(&self, request_id: &RequestId) -> anyhow::Result<bool> {
        Ok(self.get(request_id).await?.is_some())
    }

    async fn get(&self, request_id: &RequestId) -> anyhow::Result<Option<IdempotencyRecord>> {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            "SELECT request_id, operation, created_at_ms
             FROM idempotency_records
             WHERE request_id = $1",
        )
        .bind(request_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, operation, created_at_ms)| {
            IdempotencyRecord::new(RequestId::new(id), operation, created_at_ms)
        }))
    }

    async fn remove(&self, request_id: &RequestId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE request_id = $1")
            .bind(request_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> anyhow::Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM idempotency_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count)?)
    }
}
