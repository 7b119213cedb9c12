//! Postgres archive: one row per transaction in `transactions`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::ArchiveWriter;
use crate::domain::TransactionRecord;
use crate::error::Result;

pub struct PostgresArchiveWriter {
    pool: PgPool,
}

impl PostgresArchiveWriter {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let writer = Self::new(pool);
        writer.ensure_schema().await?;
        Ok(writer)
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                transaction_id TEXT PRIMARY KEY,
                from_address TEXT NOT NULL,
                data JSONB NOT NULL,
                archived_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("archive table ready");
        Ok(())
    }
}

#[async_trait]
impl ArchiveWriter for PostgresArchiveWriter {
    async fn persist(&self, record: &TransactionRecord) -> Result<()> {
        let data = serde_json::to_value(record)?;

        sqlx::query(
            r#"
            INSERT INTO transactions (transaction_id, from_address, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (transaction_id) DO UPDATE
            SET from_address = EXCLUDED.from_address,
                data = EXCLUDED.data,
                archived_at = NOW()
            "#,
        )
        .bind(&record.transaction_id)
        .bind(&record.input.from_address)
        .bind(&data)
        .execute(&self.pool)
        .await?;

        debug!(transaction_id = %record.transaction_id, "archived to postgres");
        Ok(())
    }
}
