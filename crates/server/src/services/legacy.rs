//! Legacy record migration.
//!
//! Records written before plan tiers existed carry a numeric selection limit
//! and a stored entitlement list instead of a `plan` field. This module is the
//! only place that knows about those fields. Once `sp-cli repair-all` reports
//! no drift in production it can be deleted together with its call sites in
//! `repair`.

use serde_json::Value;

use studypass_core::PlanTier;

use crate::db::UserDocument;

/// Stored entitlement lists. Entitlements are always derived from the plan,
/// so these are deleted wherever found.
pub const ENTITLEMENT_FIELDS: [&str; 2] = ["entitled_ids", "entitlements"];

/// Old numeric selection limits, superseded by the plan tier.
pub const LIMIT_FIELDS: [&str; 2] = ["selection_limit", "max_selections"];

/// Every legacy field name.
pub fn all_fields() -> impl Iterator<Item = &'static str> {
    ENTITLEMENT_FIELDS.into_iter().chain(LIMIT_FIELDS)
}

/// Legacy fields present in a document.
pub fn present_fields(doc: &UserDocument) -> impl Iterator<Item = &'static str> + '_ {
    all_fields().filter(|key| doc.contains_key(*key))
}

/// Infer a plan tier from the old numeric selection limit.
///
/// `5` maps to `tier5`, `3` to `tier3` and `1` to `trial`. Limits stored as
/// numeric strings are accepted too. Any other value infers nothing.
#[must_use]
pub fn infer_plan(doc: &UserDocument) -> Option<PlanTier> {
    LIMIT_FIELDS
        .iter()
        .filter_map(|key| doc.get(*key))
        .find_map(|value| match limit_value(value)? {
            5 => Some(PlanTier::Tier5),
            3 => Some(PlanTier::Tier3),
            1 => Some(PlanTier::Trial),
            _ => None,
        })
}

fn limit_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64().filter(|f| f.fract() == 0.0)?;
            #[allow(clippy::cast_possible_truncation)] // Limits are single digits
            let whole = f as i64;
            Some(whole)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
