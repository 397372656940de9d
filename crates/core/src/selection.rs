//! Selection normalization.
//!
//! [`normalize_selection`] turns whatever is stored or requested into a
//! selection that is a subset of the entitlement set and satisfies the tier's
//! cardinality rule. It never fails: empty, duplicated and stale input all
//! have a defined result.
//!
//! The function is idempotent. Normalizing its own output with the same
//! entitlement set and tier returns that output unchanged, which is what lets
//! the read-time repair reach a fixpoint after one write.

use std::collections::HashSet;

use crate::entitlement::EntitlementSet;
use crate::types::{CatalogId, PlanTier};

/// Normalize a raw selection against an entitlement set and plan tier.
///
/// 1. Drop ids outside the entitlement set and duplicates, keeping first-seen order.
/// 2. `all`: keep the filtered selection if non-empty, otherwise select everything.
/// 3. Tiers requiring one module: always the first entitled id.
/// 4. Otherwise truncate to the required count, or pad from the entitlement
///    set in canonical order until the count is reached or the set runs out.
#[must_use]
pub fn normalize_selection<'a, I>(
    raw: I,
    entitlement: &EntitlementSet,
    tier: PlanTier,
) -> Vec<CatalogId>
where
    I: IntoIterator<Item = &'a CatalogId>,
{
    let mut seen = HashSet::new();
    let mut filtered: Vec<CatalogId> = raw
        .into_iter()
        .filter(|id| entitlement.contains(id) && seen.insert(*id))
        .cloned()
        .collect();

    let required = tier.required_count(entitlement.len());

    if tier == PlanTier::All {
        return if filtered.is_empty() {
            entitlement.as_slice().to_vec()
        } else {
            filtered
        };
    }

    if required <= 1 {
        return entitlement.first().cloned().into_iter().collect();
    }

    if filtered.len() >= required {
        filtered.truncate(required);
        return filtered;
    }

    for id in entitlement {
        if filtered.len() >= required {
            break;
        }
        if seen.insert(id) {
            filtered.push(id.clone());
        }
    }
    filtered
}
