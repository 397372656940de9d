//! Client save path for module selections.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use studypass_core::{
    Catalog, CatalogId, UserId, normalize_selection, resolve_entitlements, schedule_lock,
};

use super::{EngineError, StateRepairLoader};
use crate::db::{DocumentPatch, DocumentStore};
use crate::models::user::{at_stored_precision, encode_selection, encode_timestamp, fields};

/// Result of a selection save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    /// The selection now in effect.
    pub saved_selection: Vec<CatalogId>,
    /// Lock expiry now in effect.
    pub lock_expiry: Option<DateTime<Utc>>,
    /// `false` when the lock window refused the edit.
    pub editable: bool,
    /// Whether anything was written.
    pub changed: bool,
}

/// Applies user selection changes under the lock window.
#[derive(Clone)]
pub struct SelectionService {
    loader: StateRepairLoader,
    store: Arc<dyn DocumentStore>,
    catalog: Arc<Catalog>,
}

impl SelectionService {
    /// Create a new selection service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, catalog: Arc<Catalog>) -> Self {
        Self {
            loader: StateRepairLoader::new(store.clone(), catalog.clone()),
            store,
            catalog,
        }
    }

    /// Save a requested selection.
    ///
    /// The stored state is repaired first, so the lock check always sees a
    /// canonical selection. A locked edit is a no-op reported through
    /// `editable`. A request that normalizes to the current selection writes
    /// nothing and leaves the lock untouched.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if reading or writing the document fails.
    #[instrument(skip(self, requested, now), fields(requested = requested.len()))]
    pub async fn save(
        &self,
        user_id: UserId,
        requested: &[CatalogId],
        now: DateTime<Utc>,
    ) -> Result<SaveOutcome, EngineError> {
        let current = self.loader.load(user_id, now).await?;

        let required = current.plan.required_count(current.entitlement_set.len());
        let decision = schedule_lock(now, current.lock_expiry, current.selection.len(), required);

        if !decision.editable {
            info!(
                user_id = %user_id,
                lock_expiry = ?current.lock_expiry,
                "Selection is locked, ignoring save"
            );
            return Ok(SaveOutcome {
                saved_selection: current.selection,
                lock_expiry: current.lock_expiry,
                editable: false,
                changed: false,
            });
        }

        let entitlement = resolve_entitlements(current.plan, &self.catalog);
        let selection = normalize_selection(requested, &entitlement, current.plan);

        if selection == current.selection {
            return Ok(SaveOutcome {
                saved_selection: current.selection,
                lock_expiry: current.lock_expiry,
                editable: true,
                changed: false,
            });
        }

        let lock_expiry = decision.next_lock_expiry.map(at_stored_precision);

        let mut patch = DocumentPatch::new();
        patch.set(fields::SELECTED, encode_selection(&selection));
        if let Some(until) = lock_expiry {
            patch.set(fields::LOCK_UNTIL, encode_timestamp(until));
        }
        self.store.merge_write(user_id, &patch).await?;

        info!(
            user_id = %user_id,
            plan = %current.plan,
            selected = selection.len(),
            lock_expiry = ?lock_expiry,
            "Saved selection"
        );

        Ok(SaveOutcome {
            saved_selection: selection,
            lock_expiry,
            editable: true,
            changed: true,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use studypass_core::add_one_month;

    use super::*;
    use crate::db::MemoryDocumentStore;
    use crate::models::{CURRENT_SCHEMA_VERSION, StoredUser};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap()
    }

    fn ids(list: &[&str]) -> Vec<CatalogId> {
        list.iter().map(|s| CatalogId::parse(s).unwrap()).collect()
    }

    async fn service_with(doc: serde_json::Value) -> (SelectionService, Arc<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert_raw(UserId::new(1), doc).await;
        let catalog = Arc::new(Catalog::from_ids(ids(&["a", "b", "c", "d", "e", "f"])));
        (SelectionService::new(store.clone(), catalog), store)
    }

    #[tokio::test]
    async fn test_unlocked_save_starts_window() {
        let (service, store) = service_with(json!({
            "plan": "tier3",
            "selected": ["a", "b", "c"],
            "schema_version": CURRENT_SCHEMA_VERSION
        }))
        .await;

        let outcome = service
            .save(UserId::new(1), &ids(&["d", "e", "f"]), now())
            .await
            .unwrap();

        assert!(outcome.editable);
        assert!(outcome.changed);
        assert_eq!(outcome.saved_selection, ids(&["d", "e", "f"]));
        assert_eq!(outcome.lock_expiry, Some(add_one_month(now())));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_locked_save_is_noop() {
        let until = now() + Duration::days(10);
        let (service, store) = service_with(json!({
            "plan": "tier3",
            "selected": ["a", "b", "c"],
            "lock_until": encode_timestamp(until),
            "schema_version": CURRENT_SCHEMA_VERSION
        }))
        .await;

        let outcome = service
            .save(UserId::new(1), &ids(&["d", "e", "f"]), now())
            .await
            .unwrap();

        assert!(!outcome.editable);
        assert!(!outcome.changed);
        assert_eq!(outcome.saved_selection, ids(&["a", "b", "c"]));
        assert_eq!(outcome.lock_expiry, Some(until));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_repaired_selection_respects_lock() {
        let until = now() + Duration::days(10);
        let (service, _) = service_with(json!({
            "plan": "tier3",
            "selected": ["a"],
            "lock_until": encode_timestamp(until),
            "schema_version": CURRENT_SCHEMA_VERSION
        }))
        .await;

        // The repair pass pads the stored selection to three, so the lock holds.
        let outcome = service
            .save(UserId::new(1), &ids(&["f"]), now())
            .await
            .unwrap();
        assert!(!outcome.editable);
        assert_eq!(outcome.saved_selection, ids(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_all_plan_partial_selection_bypasses_lock() {
        let until = now() + Duration::days(10);
        let (service, _) = service_with(json!({
            "plan": "all",
            "selected": ["a", "b"],
            "lock_until": encode_timestamp(until),
            "schema_version": CURRENT_SCHEMA_VERSION
        }))
        .await;

        let outcome = service
            .save(UserId::new(1), &ids(&["c", "stale"]), now())
            .await
            .unwrap();
        assert!(outcome.editable);
        assert!(outcome.changed);
        assert_eq!(outcome.saved_selection, ids(&["c"]));
        assert_eq!(outcome.lock_expiry, Some(until));
    }

    #[tokio::test]
    async fn test_unchanged_selection_keeps_lock() {
        let (service, store) = service_with(json!({
            "plan": "tier3",
            "selected": ["a", "b", "c"],
            "schema_version": CURRENT_SCHEMA_VERSION
        }))
        .await;

        let outcome = service
            .save(UserId::new(1), &ids(&["a", "b", "c", "d"]), now())
            .await
            .unwrap();
        assert!(outcome.editable);
        assert!(!outcome.changed);
        assert_eq!(outcome.lock_expiry, None);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_reported_lock_matches_stored_lock() {
        let (service, store) = service_with(json!({
            "plan": "tier3",
            "selected": ["a", "b", "c"],
            "schema_version": CURRENT_SCHEMA_VERSION
        }))
        .await;
        let precise_now = now() + Duration::nanoseconds(987_654_321);

        let outcome = service
            .save(UserId::new(1), &ids(&["d", "e", "f"]), precise_now)
            .await
            .unwrap();

        let doc = store.get(UserId::new(1)).await.unwrap().unwrap();
        let stored = StoredUser::new(&doc).lock_until();
        assert_eq!(outcome.lock_expiry, stored);
        assert_eq!(stored.unwrap().timestamp_subsec_nanos(), 987_000_000);
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let (service, store) = service_with(json!({"plan": "tier3"})).await;
        store.set_failing(true);

        let result = service.save(UserId::new(1), &ids(&["a"]), now()).await;
        assert!(matches!(result, Err(EngineError::Storage(_))));
    }
}
