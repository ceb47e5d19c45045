//! Postgres-backed document store over the `documents` table.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{DbError, DocumentBatch, DocumentOp, DocumentStore};

const UPSERT_DOCUMENT: &str = "INSERT INTO documents (key, value, updated_at) VALUES ($1, $2, NOW()) \
     ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()";

#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, DbError> {
        let value = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT value FROM documents WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), DbError> {
        sqlx::query(UPSERT_DOCUMENT)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM documents WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply(&self, batch: DocumentBatch) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for (key, op) in batch {
            match op {
                DocumentOp::Put(value) => {
                    sqlx::query(UPSERT_DOCUMENT)
                        .bind(key)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                }
                DocumentOp::Delete => {
                    sqlx::query("DELETE FROM documents WHERE key = $1")
                        .bind(key)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, DbError> {
        // `left()` avoids LIKE-pattern escaping; the C collation keeps byte order.
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT key FROM documents \
             WHERE left(key, char_length($1)) = $1 \
             ORDER BY key COLLATE \"C\"",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), DbError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
