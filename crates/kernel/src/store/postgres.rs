//! PostgreSQL-backed option store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use super::OptionStore;
use crate::engine::{EngineError, EngineResult};

/// Option store over a `sieve_options` table.
#[derive(Clone)]
pub struct PgOptionStore {
    pool: PgPool,
}

impl PgOptionStore {
    /// Connect and make sure the options table exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to PostgreSQL")?;

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the options table if it is missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sieve_options (\
                name TEXT PRIMARY KEY, \
                value TEXT NOT NULL, \
                updated_at BIGINT NOT NULL\
             )",
        )
        .execute(&self.pool)
        .await
        .context("failed to create sieve_options table")?;
        Ok(())
    }
}

/// Escape `LIKE` metacharacters so a prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}%")
}

#[async_trait]
impl OptionStore for PgOptionStore {
    async fn get_option(&self, name: &str) -> EngineResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM sieve_options WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::store("get_option", e))?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn set_option(&self, name: &str, value: &str) -> EngineResult<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO sieve_options (name, value, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO UPDATE SET value = $2, updated_at = $3",
        )
        .bind(name)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::store("set_option", e))?;

        Ok(())
    }

    async fn delete_option(&self, name: &str) -> EngineResult<bool> {
        let result = sqlx::query("DELETE FROM sieve_options WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::store("delete_option", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM sieve_options WHERE name LIKE $1 ESCAPE '\\'")
            .bind(like_prefix(prefix))
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::store("delete_prefix", e))?;

        Ok(result.rows_affected())
    }

    async fn healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

impl std::fmt::Debug for PgOptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgOptionStore").finish()
    }
}
