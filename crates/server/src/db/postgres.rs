//! `PostgreSQL` document store.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{instrument, warn};

use studypass_core::UserId;

use super::{DocumentPatch, DocumentStore, RepositoryError, UserDocument};

/// Document store backed by the `studypass.user_document` table.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Create a new store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Stored documents that are not JSON objects are read as empty; the repair
/// pass rewrites them on the next load.
fn into_document(user_id: UserId, value: Value) -> UserDocument {
    match value {
        Value::Object(map) => map,
        other => {
            warn!(
                user_id = %user_id,
                kind = json_kind(&other),
                "Stored user document is not an object, treating as empty"
            );
            UserDocument::new()
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self))]
    async fn get(&self, user_id: UserId) -> Result<Option<UserDocument>, RepositoryError> {
        let row: Option<Value> = sqlx::query_scalar(
            r"
            SELECT doc
            FROM studypass.user_document
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|value| into_document(user_id, value)))
    }

    #[instrument(skip(self, patch))]
    async fn merge_write(
        &self,
        user_id: UserId,
        patch: &DocumentPatch,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Make sure a row exists so FOR UPDATE has something to lock.
        sqlx::query(
            r"
            INSERT INTO studypass.user_document (user_id, doc)
            VALUES ($1, '{}'::jsonb)
            ON CONFLICT (user_id) DO NOTHING
            ",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let current: Value = sqlx::query_scalar(
            r"
            SELECT doc
            FROM studypass.user_document
            WHERE user_id = $1
            FOR UPDATE
            ",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut doc = into_document(user_id, current);
        patch.apply_to(&mut doc);

        sqlx::query(
            r"
            UPDATE studypass.user_document
            SET doc = $2, updated_at = now()
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .bind(Json(&doc))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_user_ids(&self) -> Result<Vec<UserId>, RepositoryError> {
        let ids: Vec<UserId> = sqlx::query_scalar(
            r"
            SELECT user_id
            FROM studypass.user_document
            ORDER BY user_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
