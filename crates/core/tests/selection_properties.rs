//! Property tests for entitlement resolution, selection normalization and
//! the lock window.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use studypass_core::{
    Catalog, CatalogId, PlanTier, add_one_month, normalize_selection, resolve_entitlements,
    schedule_lock,
};

fn arb_tier() -> impl Strategy<Value = PlanTier> {
    prop_oneof![
        Just(PlanTier::Trial),
        Just(PlanTier::Free),
        Just(PlanTier::Tier3),
        Just(PlanTier::Tier5),
        Just(PlanTier::All),
    ]
}

/// Ids drawn from a small alphabet so selections overlap the catalog often.
fn arb_id() -> impl Strategy<Value = CatalogId> {
    "[a-j]".prop_map(|s| CatalogId::parse(&s).unwrap_or_else(|_| unreachable!()))
}

fn arb_catalog() -> impl Strategy<Value = Catalog> {
    prop::collection::vec(arb_id(), 0..10).prop_map(Catalog::from_ids)
}

fn arb_selection() -> impl Strategy<Value = Vec<CatalogId>> {
    prop::collection::vec(arb_id(), 0..12)
}

fn arb_time() -> impl Strategy<Value = DateTime<Utc>> {
    (1_600_000_000i64..1_900_000_000).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(|| unreachable!())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn prop_normalize_idempotent(
        catalog in arb_catalog(),
        raw in arb_selection(),
        tier in arb_tier(),
    ) {
        let entitlement = resolve_entitlements(tier, &catalog);
        let once = normalize_selection(&raw, &entitlement, tier);
        let twice = normalize_selection(&once, &entitlement, tier);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_normalize_subset_of_entitlement(
        catalog in arb_catalog(),
        raw in arb_selection(),
        tier in arb_tier(),
    ) {
        let entitlement = resolve_entitlements(tier, &catalog);
        let normalized = normalize_selection(&raw, &entitlement, tier);
        for id in &normalized {
            prop_assert!(entitlement.contains(id));
        }
    }

    #[test]
    fn prop_normalize_has_no_duplicates(
        catalog in arb_catalog(),
        raw in arb_selection(),
        tier in arb_tier(),
    ) {
        let entitlement = resolve_entitlements(tier, &catalog);
        let normalized = normalize_selection(&raw, &entitlement, tier);
        let mut deduped = normalized.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(deduped.len(), normalized.len());
    }

    #[test]
    fn prop_normalize_cardinality(
        catalog in arb_catalog(),
        raw in arb_selection(),
        tier in arb_tier(),
    ) {
        let entitlement = resolve_entitlements(tier, &catalog);
        let normalized = normalize_selection(&raw, &entitlement, tier);
        let expected = match tier {
            PlanTier::Trial | PlanTier::Free => entitlement.len().min(1),
            PlanTier::Tier3 => entitlement.len().min(3),
            PlanTier::Tier5 => entitlement.len().min(5),
            PlanTier::All => {
                let mut kept: Vec<_> = raw.iter().filter(|id| entitlement.contains(id)).collect();
                kept.sort();
                kept.dedup();
                if kept.is_empty() { entitlement.len() } else { kept.len() }
            }
        };
        prop_assert_eq!(normalized.len(), expected);
    }

    #[test]
    fn prop_locked_save_keeps_expiry(
        now in arb_time(),
        ahead_secs in 1i64..5_000_000,
        required in 1usize..6,
    ) {
        let until = now + Duration::seconds(ahead_secs);
        let decision = schedule_lock(now, Some(until), required, required);
        prop_assert!(!decision.editable);
        prop_assert_eq!(decision.next_lock_expiry, Some(until));
    }

    #[test]
    fn prop_unlocked_save_starts_fresh_window(
        now in arb_time(),
        behind_secs in 0i64..5_000_000,
        len in 0usize..6,
        required in 0usize..6,
    ) {
        let expired = now - Duration::seconds(behind_secs);
        let decision = schedule_lock(now, Some(expired), len, required);
        prop_assert!(decision.editable);
        prop_assert_eq!(decision.next_lock_expiry, Some(add_one_month(now)));
    }
}
