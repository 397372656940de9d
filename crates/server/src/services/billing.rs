//! Billing callback reconciliation.
//!
//! Gateway callbacks are delivered at least once and in no particular order.
//! Each one becomes a [`BillingPatch`] that is merged field by field into the
//! stored billing sub-record. A merge that leaves the record reporting an
//! active paid plan also promotes the user into that plan.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use studypass_core::{
    BillingPatch, BillingRecord, Catalog, PlanTier, UserId, add_one_month, normalize_selection,
    resolve_entitlements,
};

use super::{EngineError, legacy};
use crate::db::{DocumentPatch, DocumentStore};
use crate::models::user::{
    at_stored_precision, billing_fields, encode_selection, encode_timestamp, fields,
};
use crate::models::{CURRENT_SCHEMA_VERSION, StoredUser};

/// Result of reconciling one billing callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// Plan the user was moved into, if this callback promoted them.
    pub promoted_to: Option<PlanTier>,
    /// Billing record after the merge.
    pub billing: BillingRecord,
}

/// Merges billing callbacks into user documents.
#[derive(Clone)]
pub struct BillingReconciler {
    store: Arc<dyn DocumentStore>,
    catalog: Arc<Catalog>,
}

impl BillingReconciler {
    /// Create a new reconciler.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }

    /// Merge a billing patch into a user's record.
    ///
    /// The stored document is read first so the promotion can normalize the
    /// existing selection. Billing fields, promotion fields and `updated_at`
    /// go out in one merge write. Promotion resets the lock to one month from
    /// `now` regardless of any running lock.
    ///
    /// A redelivered callback that changes no billing field of a user already
    /// on the paid plan does not promote again, so duplicates leave plan,
    /// selection and lock exactly as the first delivery did.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if the read or the write fails.
    #[instrument(skip(self, patch, now))]
    pub async fn apply(
        &self,
        user_id: UserId,
        patch: &BillingPatch,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, EngineError> {
        let doc = self.store.get(user_id).await?.unwrap_or_default();
        let stored = StoredUser::new(&doc);
        let before = stored.billing();
        let mut billing = before.merged(patch);
        billing.current_period_end = billing.current_period_end.map(at_stored_precision);

        if patch.is_empty() {
            debug!(user_id = %user_id, "Empty billing patch, nothing to merge");
            return Ok(ReconcileOutcome {
                promoted_to: None,
                billing,
            });
        }

        let mut write = DocumentPatch::new();
        write.set(fields::BILLING, encode_billing_patch(patch, now));

        let promoted_to = billing
            .promotion_tier()
            .filter(|tier| billing != before || stored.plan() != Some(*tier));

        if let Some(tier) = promoted_to {
            let entitlement = resolve_entitlements(tier, &self.catalog);
            let selection = normalize_selection(&stored.selection(), &entitlement, tier);

            write
                .set(fields::PLAN, tier.as_str())
                .set(fields::SELECTED, encode_selection(&selection))
                .set(fields::LOCK_UNTIL, encode_timestamp(add_one_month(now)))
                .set(fields::SCHEMA_VERSION, CURRENT_SCHEMA_VERSION);
            for key in legacy::present_fields(&doc) {
                write.remove(key);
            }
        }

        self.store.merge_write(user_id, &write).await?;

        info!(
            user_id = %user_id,
            status = ?billing.status,
            current_plan = ?billing.current_plan,
            promoted_to = ?promoted_to,
            "Reconciled billing callback"
        );

        Ok(ReconcileOutcome {
            promoted_to,
            billing,
        })
    }
}

/// Stored form of the fields a patch carries, stamped with `updated_at`.
fn encode_billing_patch(patch: &BillingPatch, now: DateTime<Utc>) -> Map<String, Value> {
    let mut out = Map::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            out.insert(key.to_string(), value);
        }
    };

    put(
        billing_fields::ACCOUNT_TYPE,
        patch.account_type.map(|v| v.as_str().into()),
    );
    put(billing_fields::METHOD, patch.method.map(|v| v.as_str().into()));
    put(billing_fields::STATUS, patch.status.map(|v| v.as_str().into()));
    put(
        billing_fields::CURRENT_PLAN,
        patch.current_plan.map(|v| v.as_str().into()),
    );
    put(
        billing_fields::CURRENT_PERIOD_END,
        patch.current_period_end.map(encode_timestamp),
    );
    put(
        billing_fields::PROVIDER_SESSION_ID,
        patch.provider_session_id.clone().map(Value::from),
    );
    put(
        billing_fields::PROVIDER_PAYMENT_ID,
        patch.provider_payment_id.clone().map(Value::from),
    );
    put(billing_fields::UPDATED_AT, Some(encode_timestamp(now)));

    out
}
