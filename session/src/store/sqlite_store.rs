//! SqliteSessionStore
//! --------------------
//! A **SQLite-backed implementation** of the `SessionStore` trait that
//! emulates a document store on a single two-column table:
//!
//!  - one row per physical key, the whole session kept as a JSON document
//!  - conditional writes expressed as single statements, so the registry's
//!    "register only if absent" contract holds across processes sharing the file
//!  - prefix enumeration served by the primary-key index
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use super::SessionStore;

/// SQLite-based persistence backend for session documents.
///
/// This struct implements the `SessionStore` trait and provides:
///
///   - schema creation on startup (`migrate`)
///   - atomic set-if-absent (`INSERT ... ON CONFLICT DO NOTHING`)
///   - compare-and-swap / compare-and-delete on the stored document
///   - sorted prefix scans (`keys`)
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (creating if missing) the database at `url` and ensure the schema exists.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid sqlite url {url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open {url}"))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Creates the documents table if it does not exist.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_documents (
                key TEXT PRIMARY KEY NOT NULL,
                document TEXT NOT NULL
            );
        "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create session_documents table")?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM session_documents WHERE key = ?)")
            .bind(key)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<i64, _>(0)? != 0)
    }

    async fn set_if_absent(&self, key: &str, document: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO session_documents (key, document)
            VALUES (?, ?)
            ON CONFLICT(key) DO NOTHING;
        "#,
        )
        .bind(key)
        .bind(document)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace_if_equals(
        &self,
        key: &str,
        expected: &str,
        document: &str,
    ) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE session_documents SET document = ? WHERE key = ? AND document = ?")
                .bind(document)
                .bind(key)
                .bind(expected)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT document FROM session_documents WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_get::<String, _>("document"))
            .transpose()
            .map_err(Into::into)
    }

    async fn delete(&self, key: &str) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM session_documents WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM session_documents WHERE key = ? AND document = ?")
            .bind(key)
            .bind(expected)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        // substr instead of LIKE: prefixes may contain '%' or '_'.
        let rows = sqlx::query(
            "SELECT key FROM session_documents WHERE substr(key, 1, length(?)) = ? ORDER BY key",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("key").map_err(Into::into))
            .collect()
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
