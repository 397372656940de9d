//! Self-healing read path.
//!
//! Every page load goes through [`StateRepairLoader::load`]. It derives the
//! canonical plan view from whatever is stored, and if the stored document
//! disagrees with that view it writes back exactly the drifted fields in one
//! merge. A second load with no writes in between finds nothing to fix.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument};

use studypass_core::{
    Catalog, PlanTier, UserId, normalize_selection, resolve_entitlements, schedule_lock,
};

use super::{EngineError, legacy};
use crate::db::{DocumentPatch, DocumentStore, UserDocument};
use crate::models::user::{encode_selection, encode_timestamp, fields};
use crate::models::{CURRENT_SCHEMA_VERSION, CanonicalState, StoredUser};

/// Canonical view of a document together with the patch that would make the
/// stored document agree with it.
#[derive(Debug, Clone)]
pub struct Repair {
    pub state: CanonicalState,
    /// Empty when the stored document is already canonical.
    pub patch: DocumentPatch,
}

impl Repair {
    /// Whether the stored document drifted from its canonical form.
    #[must_use]
    pub fn needs_write(&self) -> bool {
        !self.patch.is_empty()
    }
}

/// Resolve the plan tier of a stored document.
///
/// A valid stored tier wins. Records without one are migrated from their
/// legacy selection limit, and anything else starts on `trial`.
#[must_use]
pub fn resolve_plan(doc: &UserDocument) -> PlanTier {
    if let Some(plan) = StoredUser::new(doc).plan() {
        return plan;
    }
    if let Some(plan) = legacy::infer_plan(doc) {
        debug!(plan = %plan, "Inferred plan from legacy selection limit");
        return plan;
    }
    PlanTier::Trial
}

/// Compute the canonical view of a stored document and the corrective patch.
#[must_use]
pub fn plan_repair(doc: &UserDocument, catalog: &Catalog, now: DateTime<Utc>) -> Repair {
    let stored = StoredUser::new(doc);

    let plan = resolve_plan(doc);
    let entitlement = resolve_entitlements(plan, catalog);
    let selection = normalize_selection(&stored.selection(), &entitlement, plan);
    let lock_expiry = stored.lock_until();

    let mut patch = DocumentPatch::new();

    let plan_value = Value::from(plan.as_str());
    if stored.field(fields::PLAN) != Some(&plan_value) {
        patch.set(fields::PLAN, plan_value);
    }

    let selection_value = encode_selection(&selection);
    if stored.field(fields::SELECTED) != Some(&selection_value) {
        patch.set(fields::SELECTED, selection_value);
    }

    // Rewrite readable locks in the current encoding, drop unreadable ones.
    match (stored.field(fields::LOCK_UNTIL), lock_expiry) {
        (Some(raw), Some(at)) => {
            let encoded = encode_timestamp(at);
            if *raw != encoded {
                patch.set(fields::LOCK_UNTIL, encoded);
            }
        }
        (Some(raw), None) if !raw.is_null() => {
            patch.remove(fields::LOCK_UNTIL);
        }
        _ => {}
    }

    for key in legacy::present_fields(doc) {
        patch.remove(key);
    }

    let version_value = Value::from(CURRENT_SCHEMA_VERSION);
    if stored.field(fields::SCHEMA_VERSION) != Some(&version_value) {
        patch.set(fields::SCHEMA_VERSION, version_value);
    }

    let required = plan.required_count(entitlement.len());
    let editable = schedule_lock(now, lock_expiry, selection.len(), required).editable;

    Repair {
        state: CanonicalState {
            plan,
            entitlement_set: entitlement.into_vec(),
            selection,
            lock_expiry,
            display_name: stored.display_name(),
            schema_version: CURRENT_SCHEMA_VERSION,
            editable,
        },
        patch,
    }
}

/// Loads canonical plan state, repairing stored drift on the way.
#[derive(Clone)]
pub struct StateRepairLoader {
    store: Arc<dyn DocumentStore>,
    catalog: Arc<Catalog>,
}

impl StateRepairLoader {
    /// Create a new loader.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }

    /// Compute the repair for a user without writing anything.
    ///
    /// A user with no stored document is treated as an empty document.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if the document cannot be read.
    pub async fn inspect(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Repair, EngineError> {
        let doc = self.store.get(user_id).await?.unwrap_or_default();
        Ok(plan_repair(&doc, &self.catalog, now))
    }

    /// Load the canonical state of a user, writing back any drift.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if the read or the corrective write
    /// fails. No partially repaired view is ever returned.
    #[instrument(skip(self, now))]
    pub async fn load(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<CanonicalState, EngineError> {
        let Repair { state, patch } = self.inspect(user_id, now).await?;

        if !patch.is_empty() {
            info!(
                user_id = %user_id,
                plan = %state.plan,
                set = ?patch.fields().keys().collect::<Vec<_>>(),
                removed = ?patch.removed(),
                "Repairing drifted user document"
            );
            self.store.merge_write(user_id, &patch).await?;
        }

        Ok(state)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use studypass_core::{BillingPatch, BillingStatus, CatalogId, add_one_month};

    use super::*;
    use crate::db::MemoryDocumentStore;
    use crate::services::BillingReconciler;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap()
    }

    fn catalog(ids: &[&str]) -> Arc<Catalog> {
        Arc::new(Catalog::from_ids(ids.iter().map(|s| CatalogId::parse(s).unwrap())))
    }

    fn strs(ids: &[CatalogId]) -> Vec<&str> {
        ids.iter().map(CatalogId::as_str).collect()
    }

    async fn loader_with(
        doc: Value,
        ids: &[&str],
    ) -> (StateRepairLoader, Arc<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert_raw(UserId::new(1), doc).await;
        let loader = StateRepairLoader::new(store.clone(), catalog(ids));
        (loader, store)
    }

    #[tokio::test]
    async fn test_tier3_truncates_stored_selection() {
        let (loader, _) = loader_with(
            json!({"plan": "tier3", "selected": ["a", "b", "c", "d"]}),
            &["a", "b", "c", "d", "e", "f"],
        )
        .await;

        let state = loader.load(UserId::new(1), now()).await.unwrap();
        assert_eq!(strs(&state.selection), ["a", "b", "c"]);
        assert_eq!(strs(&state.entitlement_set), ["a", "b", "c", "d", "e", "f"]);
    }

    #[tokio::test]
    async fn test_trial_collapses_to_first_module() {
        let (loader, store) =
            loader_with(json!({"plan": "trial", "selected": ["c"]}), &["a", "b", "c"]).await;

        let state = loader.load(UserId::new(1), now()).await.unwrap();
        assert_eq!(strs(&state.selection), ["a"]);

        let doc = store.get(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(doc.get("selected"), Some(&json!(["a"])));
    }

    #[tokio::test]
    async fn test_second_load_is_a_fixpoint() {
        let (loader, store) = loader_with(
            json!({
                "plan": "tier5",
                "selected": [],
                "entitled_ids": ["a"],
                "lock_until": 1_767_225_600_000_i64
            }),
            &["a", "b", "c", "d", "e", "f", "g"],
        )
        .await;

        let first = loader.load(UserId::new(1), now()).await.unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(strs(&first.selection), ["a", "b", "c", "d", "e"]);

        let second = loader.load(UserId::new(1), now()).await.unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_canonical_document_is_not_rewritten() {
        let (loader, store) = loader_with(
            json!({
                "plan": "all",
                "selected": ["x", "y"],
                "schema_version": CURRENT_SCHEMA_VERSION,
                "display_name": "Grace"
            }),
            &["x", "y", "z"],
        )
        .await;

        let state = loader.load(UserId::new(1), now()).await.unwrap();
        assert_eq!(strs(&state.selection), ["x", "y"]);
        assert_eq!(state.display_name.as_deref(), Some("Grace"));
        assert!(state.editable);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_legacy_record_is_migrated() {
        let (loader, store) = loader_with(
            json!({
                "selection_limit": 3,
                "entitled_ids": ["a", "b"],
                "selected": ["b"],
                "display_name": "Lin"
            }),
            &["a", "b", "c", "d"],
        )
        .await;

        let state = loader.load(UserId::new(1), now()).await.unwrap();
        assert_eq!(state.plan, PlanTier::Tier3);
        assert_eq!(strs(&state.selection), ["b", "a", "c"]);

        let doc = store.get(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({
                "plan": "tier3",
                "selected": ["b", "a", "c"],
                "display_name": "Lin",
                "schema_version": CURRENT_SCHEMA_VERSION
            })
        );
    }

    #[tokio::test]
    async fn test_valid_plan_beats_legacy_limit() {
        let (loader, _) = loader_with(
            json!({"plan": "tier5", "selection_limit": 1}),
            &["a", "b", "c", "d", "e", "f"],
        )
        .await;

        let state = loader.load(UserId::new(1), now()).await.unwrap();
        assert_eq!(state.plan, PlanTier::Tier5);
    }

    #[tokio::test]
    async fn test_garbage_defaults_to_trial() {
        let (loader, _) = loader_with(
            json!({"plan": 42, "selected": "a", "lock_until": "soon"}),
            &["a", "b"],
        )
        .await;

        let state = loader.load(UserId::new(1), now()).await.unwrap();
        assert_eq!(state.plan, PlanTier::Trial);
        assert_eq!(strs(&state.selection), ["a"]);
        assert_eq!(state.lock_expiry, None);
    }

    #[tokio::test]
    async fn test_missing_record_is_created() {
        let store = Arc::new(MemoryDocumentStore::new());
        let loader = StateRepairLoader::new(store.clone(), catalog(&["a", "b"]));

        let state = loader.load(UserId::new(7), now()).await.unwrap();
        assert_eq!(state.plan, PlanTier::Trial);
        assert_eq!(strs(&state.selection), ["a"]);
        assert!(store.get(UserId::new(7)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_read_failure_propagates_without_write() {
        let (loader, store) = loader_with(json!({"plan": "tier3"}), &["a"]).await;
        store.set_failing(true);

        let result = loader.load(UserId::new(1), now()).await;
        assert!(matches!(result, Err(EngineError::Storage(_))));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_returns_no_view() {
        let (loader, store) = loader_with(json!({"plan": "tier3"}), &["a", "b", "c"]).await;
        store.set_failing_writes(true);

        let result = loader.load(UserId::new(1), now()).await;
        assert!(matches!(result, Err(EngineError::Storage(_))));

        let doc = store.get(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(Value::Object(doc), json!({"plan": "tier3"}));
    }

    #[tokio::test]
    async fn test_unstorable_lock_is_dropped_once() {
        // Year 11476: decodable as milliseconds, not as RFC 3339 text.
        let (loader, store) = loader_with(
            json!({
                "plan": "tier3",
                "selected": ["a", "b", "c"],
                "lock_until": 300_000_000_000_000_i64,
                "schema_version": CURRENT_SCHEMA_VERSION
            }),
            &["a", "b", "c", "d"],
        )
        .await;

        let first = loader.load(UserId::new(1), now()).await.unwrap();
        assert_eq!(first.lock_expiry, None);
        assert!(first.editable);
        assert_eq!(store.write_count(), 1);
        let doc = store.get(UserId::new(1)).await.unwrap().unwrap();
        assert!(!doc.contains_key("lock_until"));

        let second = loader.load(UserId::new(1), now()).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_submillisecond_lock_gives_stable_view() {
        let (loader, store) = loader_with(
            json!({
                "plan": "tier3",
                "selected": ["a", "b", "c"],
                "lock_until": "2026-11-01T00:00:00.123456Z",
                "schema_version": CURRENT_SCHEMA_VERSION
            }),
            &["a", "b", "c", "d"],
        )
        .await;

        let first = loader.load(UserId::new(1), now()).await.unwrap();
        let second = loader.load(UserId::new(1), now()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.lock_expiry.unwrap().timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_save_after_promotion_heals_on_next_load() {
        let ids = ["a", "b", "c", "d", "e", "f", "g"];
        let (loader, store) = loader_with(
            json!({
                "plan": "tier3",
                "selected": ["a", "b", "c"],
                "schema_version": CURRENT_SCHEMA_VERSION
            }),
            &ids,
        )
        .await;
        let user = UserId::new(1);
        let reconciler = BillingReconciler::new(store.clone(), catalog(&ids));

        // A save computed against the tier3 view ...
        let mut stale_save = DocumentPatch::new();
        stale_save
            .set(fields::SELECTED, json!(["e", "f", "g"]))
            .set(fields::LOCK_UNTIL, encode_timestamp(add_one_month(now())));

        // ... lands after the tier5 promotion.
        let paid = BillingPatch {
            status: Some(BillingStatus::Active),
            current_plan: Some(PlanTier::Tier5),
            ..Default::default()
        };
        reconciler.apply(user, &paid, now()).await.unwrap();
        store.merge_write(user, &stale_save).await.unwrap();
        let writes = store.write_count();

        let healed = loader.load(user, now()).await.unwrap();
        assert_eq!(healed.plan, PlanTier::Tier5);
        assert_eq!(strs(&healed.selection), ["e", "f", "g", "a", "b"]);
        assert_eq!(store.write_count(), writes + 1);

        let again = loader.load(user, now()).await.unwrap();
        assert_eq!(again, healed);
        assert_eq!(store.write_count(), writes + 1);
    }

    #[test]
    fn test_lock_is_reencoded_once() {
        let raw = match json!({
            "plan": "free",
            "selected": ["a"],
            "schema_version": CURRENT_SCHEMA_VERSION,
            "lock_until": "2026-11-01T00:00:00+00:00"
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let catalog = catalog(&["a"]);

        let repair = plan_repair(&raw, &catalog, now());
        assert_eq!(
            repair.patch.fields().get("lock_until"),
            Some(&json!("2026-11-01T00:00:00.000Z"))
        );
        assert!(!repair.state.editable);

        let mut repaired = raw;
        repair.patch.apply_to(&mut repaired);
        assert!(!plan_repair(&repaired, &catalog, now()).needs_write());
    }
}
