//! Plan tier to entitlement set.
//!
//! The entitlement set is always derived, never stored. Recomputing it from
//! the tier on every read leaves exactly one source of truth for what a user
//! may select.

use serde::Serialize;

use crate::types::{Catalog, CatalogId, PlanTier};

/// Catalog ids a plan tier makes eligible for selection, in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EntitlementSet(Vec<CatalogId>);

impl EntitlementSet {
    /// Ids in canonical order.
    #[must_use]
    pub fn as_slice(&self) -> &[CatalogId] {
        &self.0
    }

    /// Whether `id` is entitled.
    #[must_use]
    pub fn contains(&self, id: &CatalogId) -> bool {
        self.0.contains(id)
    }

    /// Number of entitled ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is entitled (only possible with an empty catalog).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first entitled id in canonical order.
    #[must_use]
    pub fn first(&self) -> Option<&CatalogId> {
        self.0.first()
    }

    /// Iterate entitled ids in canonical order.
    pub fn iter(&self) -> std::slice::Iter<'_, CatalogId> {
        self.0.iter()
    }

    /// Consume the set, returning the ids.
    #[must_use]
    pub fn into_vec(self) -> Vec<CatalogId> {
        self.0
    }
}

impl<'a> IntoIterator for &'a EntitlementSet {
    type Item = &'a CatalogId;
    type IntoIter = std::slice::Iter<'a, CatalogId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Resolve the entitlement set for a plan tier.
///
/// `trial` and `free` are entitled to the first catalog module only; every
/// paid tier is entitled to the whole catalog and differs only in how many
/// modules it may select at once.
#[must_use]
pub fn resolve_entitlements(tier: PlanTier, catalog: &Catalog) -> EntitlementSet {
    let ids = match tier {
        PlanTier::Trial | PlanTier::Free => catalog.first().cloned().into_iter().collect(),
        PlanTier::Tier3 | PlanTier::Tier5 | PlanTier::All => catalog.ids().cloned().collect(),
    };
    EntitlementSet(ids)
}
