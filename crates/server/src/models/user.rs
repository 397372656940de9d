//! User document schema and the canonical plan view.
//!
//! Stored documents are read through [`StoredUser`], which never fails: a
//! field that is missing or has the wrong shape reads as absent. Deciding
//! what an absent field means is left to the repair pass.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;
use serde_json::Value;

use studypass_core::{
    AccountType, BillingRecord, BillingStatus, CatalogId, PaymentMethod, PlanTier,
};

use crate::db::UserDocument;

/// Schema version stamped on every document the repair pass has touched.
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// Top-level document field names.
pub mod fields {
    pub const PLAN: &str = "plan";
    pub const SELECTED: &str = "selected";
    pub const LOCK_UNTIL: &str = "lock_until";
    pub const DISPLAY_NAME: &str = "display_name";
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const BILLING: &str = "billing";
}

/// Billing sub-document field names.
pub mod billing_fields {
    pub const ACCOUNT_TYPE: &str = "account_type";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
    pub const CURRENT_PLAN: &str = "current_plan";
    pub const CURRENT_PERIOD_END: &str = "current_period_end";
    pub const PROVIDER_SESSION_ID: &str = "provider_session_id";
    pub const PROVIDER_PAYMENT_ID: &str = "provider_payment_id";
    pub const UPDATED_AT: &str = "updated_at";
}

/// Timestamp encoding used for every stored date.
#[must_use]
pub fn encode_timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Drop precision finer than what [`encode_timestamp`] keeps.
#[must_use]
pub fn at_stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

/// Decode a stored timestamp: RFC 3339 strings, or integer epoch
/// milliseconds as written by older clients.
///
/// The result is cut to stored precision. A date whose stored form would
/// not read back (years outside 0000-9999) is unreadable.
#[must_use]
pub fn decode_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let at = match value {
        Value::String(s) => parse_rfc3339(s)?,
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis)?,
        _ => return None,
    };
    let at = at_stored_precision(at);

    let stored = at.to_rfc3339_opts(SecondsFormat::Millis, true);
    (parse_rfc3339(&stored) == Some(at)).then_some(at)
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Encode a selection for storage.
#[must_use]
pub fn encode_selection(selection: &[CatalogId]) -> Value {
    Value::Array(
        selection
            .iter()
            .map(|id| Value::String(id.to_string()))
            .collect(),
    )
}

/// Lenient read-only view over a raw user document.
#[derive(Debug, Clone, Copy)]
pub struct StoredUser<'a> {
    doc: &'a UserDocument,
}

impl<'a> StoredUser<'a> {
    #[must_use]
    pub const fn new(doc: &'a UserDocument) -> Self {
        Self { doc }
    }

    /// Raw value of a top-level field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&'a Value> {
        self.doc.get(key)
    }

    /// Stored plan tier, if it is one of the five valid names.
    #[must_use]
    pub fn plan(&self) -> Option<PlanTier> {
        self.doc
            .get(fields::PLAN)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    /// Stored selection. Entries that are not valid catalog ids are dropped.
    #[must_use]
    pub fn selection(&self) -> Vec<CatalogId> {
        self.doc
            .get(fields::SELECTED)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| CatalogId::parse(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stored lock expiry, if present and readable.
    #[must_use]
    pub fn lock_until(&self) -> Option<DateTime<Utc>> {
        self.doc.get(fields::LOCK_UNTIL).and_then(decode_timestamp)
    }

    /// Stored display name.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        self.doc
            .get(fields::DISPLAY_NAME)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    /// Stored billing sub-record. Unrecognized values read as absent.
    #[must_use]
    pub fn billing(&self) -> BillingRecord {
        let Some(billing) = self.doc.get(fields::BILLING).and_then(Value::as_object) else {
            return BillingRecord::default();
        };

        let text = |key: &str| billing.get(key).and_then(Value::as_str);

        BillingRecord {
            account_type: text(billing_fields::ACCOUNT_TYPE)
                .and_then(|s| s.parse::<AccountType>().ok()),
            method: text(billing_fields::METHOD).and_then(|s| s.parse::<PaymentMethod>().ok()),
            status: text(billing_fields::STATUS).and_then(|s| s.parse::<BillingStatus>().ok()),
            current_plan: text(billing_fields::CURRENT_PLAN)
                .and_then(|s| s.parse::<PlanTier>().ok()),
            current_period_end: billing
                .get(billing_fields::CURRENT_PERIOD_END)
                .and_then(decode_timestamp),
            provider_session_id: text(billing_fields::PROVIDER_SESSION_ID).map(str::to_owned),
            provider_payment_id: text(billing_fields::PROVIDER_PAYMENT_ID).map(str::to_owned),
        }
    }
}

/// Canonical plan and selection state of a user.
///
/// This is what every page-level caller reads. It is computed from the
/// stored document, never stored itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalState {
    pub plan: PlanTier,
    pub entitlement_set: Vec<CatalogId>,
    pub selection: Vec<CatalogId>,
    pub lock_expiry: Option<DateTime<Utc>>,
    pub display_name: Option<String>,
    pub schema_version: i64,
    /// Whether a selection change would be accepted right now.
    pub editable: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> UserDocument {
        match value {
            Value::Object(map) => map,
            _ => UserDocument::new(),
        }
    }

    #[test]
    fn test_reads_well_formed_document() {
        let raw = doc(json!({
            "plan": "tier5",
            "selected": ["a", "b"],
            "lock_until": "2026-05-01T00:00:00.000Z",
            "display_name": "Ada",
            "schema_version": 2
        }));
        let user = StoredUser::new(&raw);

        assert_eq!(user.plan(), Some(PlanTier::Tier5));
        assert_eq!(user.selection().len(), 2);
        assert_eq!(
            user.lock_until(),
            Some(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(user.display_name().as_deref(), Some("Ada"));
    }

    #[test]
    fn test_malformed_fields_read_as_absent() {
        let raw = doc(json!({
            "plan": "gold",
            "selected": ["a", 7, null, "", "b"],
            "lock_until": "next tuesday",
            "display_name": 12,
            "schema_version": "2",
            "billing": ["not", "an", "object"]
        }));
        let user = StoredUser::new(&raw);

        assert_eq!(user.plan(), None);
        let ids: Vec<_> = user.selection().iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(user.lock_until(), None);
        assert_eq!(user.display_name(), None);
        assert_eq!(user.billing(), BillingRecord::default());
    }

    #[test]
    fn test_legacy_millisecond_lock() {
        let raw = doc(json!({"lock_until": 1_767_225_600_000_i64}));
        let user = StoredUser::new(&raw);
        assert_eq!(
            user.lock_until(),
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_lock_read_at_stored_precision() {
        let raw = doc(json!({"lock_until": "2026-11-01T00:00:00.123456Z"}));
        let at = StoredUser::new(&raw).lock_until().unwrap();

        assert_eq!(at.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(decode_timestamp(&encode_timestamp(at)), Some(at));
    }

    #[test]
    fn test_lock_beyond_year_9999_is_unreadable() {
        let raw = doc(json!({"lock_until": 300_000_000_000_000_i64}));
        assert_eq!(StoredUser::new(&raw).lock_until(), None);
        assert_eq!(decode_timestamp(&json!("+11476-08-15T05:20:00.000Z")), None);
        assert!(decode_timestamp(&json!(253_402_300_799_000_i64)).is_some());
    }

    #[test]
    fn test_billing_unknown_values_dropped() {
        let raw = doc(json!({
            "billing": {
                "status": "refunded",
                "current_plan": "tier3",
                "method": "card",
                "provider_session_id": "cs_1"
            }
        }));
        let billing = StoredUser::new(&raw).billing();
        assert_eq!(billing.status, None);
        assert_eq!(billing.current_plan, Some(PlanTier::Tier3));
        assert_eq!(billing.method, Some(PaymentMethod::Card));
        assert_eq!(billing.provider_session_id.as_deref(), Some("cs_1"));
    }

    #[test]
    fn test_timestamp_encoding_round_trips() {
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 8, 30, 0).unwrap();
        assert_eq!(decode_timestamp(&encode_timestamp(at)), Some(at));
    }
}
