//! Per-user document storage.
//!
//! # Table: `studypass.user_document`
//!
//! One JSONB document per user holding plan, selection, lock and billing
//! fields. Writers never replace a document; they send a [`DocumentPatch`]
//! that is deep-merged into what is stored, so the client save path and the
//! billing callback can write the same record without clobbering each other's
//! fields.
//!
//! # Backends
//!
//! - [`PgDocumentStore`] - `PostgreSQL`, merge applied under `SELECT ... FOR UPDATE`
//! - [`MemoryDocumentStore`] - in-process map for local development and tests
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p studypass-cli -- migrate
//! ```

mod memory;
mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use studypass_core::UserId;

use crate::config::StoreBackend;

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

/// A raw user document as stored. May be partial, stale or malformed.
pub type UserDocument = Map<String, Value>;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Document store with field-level merge writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a user's document, `None` if the user has none.
    async fn get(&self, user_id: UserId) -> Result<Option<UserDocument>, RepositoryError>;

    /// Merge a patch into a user's document, creating it if missing.
    async fn merge_write(&self, user_id: UserId, patch: &DocumentPatch)
    -> Result<(), RepositoryError>;

    /// Every user id with a stored document, ascending.
    async fn list_user_ids(&self) -> Result<Vec<UserId>, RepositoryError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// A partial document update.
///
/// Object values in `set` merge recursively into stored objects; any other
/// value replaces what is stored. Keys in `remove` are deleted from the top
/// level after the merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    set: Map<String, Value>,
    remove: Vec<String>,
}

impl DocumentPatch {
    /// Create an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a top-level field.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.set.insert(key.to_string(), value.into());
        self
    }

    /// Delete a top-level field.
    pub fn remove(&mut self, key: &str) -> &mut Self {
        if !self.remove.iter().any(|k| k == key) {
            self.remove.push(key.to_string());
        }
        self
    }

    /// Fields this patch sets.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.set
    }

    /// Fields this patch deletes.
    #[must_use]
    pub fn removed(&self) -> &[String] {
        &self.remove
    }

    /// Whether applying this patch could change anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    /// Apply this patch to a document in place.
    pub fn apply_to(&self, doc: &mut UserDocument) {
        deep_merge(doc, &self.set);
        for key in &self.remove {
            doc.remove(key);
        }
    }
}

fn deep_merge(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Open the document store a backend names.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the `PostgreSQL` pool cannot connect.
pub async fn connect_store(
    backend: &StoreBackend,
) -> Result<Arc<dyn DocumentStore>, RepositoryError> {
    match backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory document store, records are lost on restart");
            Ok(Arc::new(MemoryDocumentStore::new()))
        }
        StoreBackend::Postgres(url) => {
            let pool = create_pool(url).await?;
            tracing::info!("Database pool created");
            Ok(Arc::new(PgDocumentStore::new(pool)))
        }
    }
}
