//! In-memory document store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use studypass_core::UserId;

use super::{DocumentPatch, DocumentStore, RepositoryError, UserDocument};

/// Document store held in process memory.
///
/// Applies patches with the same merge rules as [`super::PgDocumentStore`].
/// Counts merge writes and can be switched into a failing mode so callers can
/// observe how storage errors propagate.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<BTreeMap<UserId, UserDocument>>,
    writes: AtomicUsize,
    failing_reads: AtomicBool,
    failing_writes: AtomicBool,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw document as-is, bypassing merge and the write counter.
    ///
    /// Non-object values are stored as an empty document, matching how the
    /// `PostgreSQL` store reads them back.
    pub async fn insert_raw(&self, user_id: UserId, value: Value) {
        let doc = match value {
            Value::Object(map) => map,
            _ => UserDocument::new(),
        };
        self.docs.write().await.insert(user_id, doc);
    }

    /// Number of merge writes applied so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Make only merge writes fail, reads keep working.
    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, operation: &str) -> Result<(), RepositoryError> {
        if flag.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(format!(
                "memory store is failing {operation}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, user_id: UserId) -> Result<Option<UserDocument>, RepositoryError> {
        Self::check(&self.failing_reads, "reads")?;
        Ok(self.docs.read().await.get(&user_id).cloned())
    }

    async fn merge_write(
        &self,
        user_id: UserId,
        patch: &DocumentPatch,
    ) -> Result<(), RepositoryError> {
        Self::check(&self.failing_writes, "writes")?;
        let mut docs = self.docs.write().await;
        patch.apply_to(docs.entry(user_id).or_default());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_user_ids(&self) -> Result<Vec<UserId>, RepositoryError> {
        Self::check(&self.failing_reads, "reads")?;
        Ok(self.docs.read().await.keys().copied().collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Self::check(&self.failing_reads, "reads")
    }
}
