//! Subscription plan tiers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a string is not one of the five plan tier names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid plan tier: {0}")]
pub struct ParsePlanError(pub String);

/// Subscription level controlling how many catalog modules a user may study.
///
/// The tiers carry no numeric ordering. The only ordinal meaning is the
/// number of modules a selection must hold, see [`PlanTier::required_count`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    /// New account, before any purchase.
    #[default]
    Trial,
    /// Permanent free plan.
    Free,
    /// Three modules per billing cycle.
    Tier3,
    /// Five modules per billing cycle.
    Tier5,
    /// The whole catalog.
    All,
}

impl PlanTier {
    /// Every tier, in declaration order.
    pub const ALL_TIERS: [Self; 5] = [Self::Trial, Self::Free, Self::Tier3, Self::Tier5, Self::All];

    /// The tiers a payment can promote a user into.
    pub const PAID_TIERS: [Self; 3] = [Self::Tier3, Self::Tier5, Self::All];

    /// Number of modules a selection on this tier must contain.
    ///
    /// `All` has no cap of its own, so it resolves to the size of the
    /// entitlement set it is checked against.
    #[must_use]
    pub const fn required_count(self, entitlement_len: usize) -> usize {
        match self {
            Self::Trial | Self::Free => 1,
            Self::Tier3 => 3,
            Self::Tier5 => 5,
            Self::All => entitlement_len,
        }
    }

    /// Whether this tier is only reachable through a payment.
    #[must_use]
    pub const fn is_paid(self) -> bool {
        match self {
            Self::Tier3 | Self::Tier5 | Self::All => true,
            Self::Trial | Self::Free => false,
        }
    }

    /// Wire name, as stored in user documents and gateway metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Free => "free",
            Self::Tier3 => "tier3",
            Self::Tier5 => "tier5",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanTier {
    type Err = ParsePlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(Self::Trial),
            "free" => Ok(Self::Free),
            "tier3" => Ok(Self::Tier3),
            "tier5" => Ok(Self::Tier5),
            "all" => Ok(Self::All),
            _ => Err(ParsePlanError(s.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_required_count_per_tier() {
        assert_eq!(PlanTier::Trial.required_count(10), 1);
        assert_eq!(PlanTier::Free.required_count(10), 1);
        assert_eq!(PlanTier::Tier3.required_count(10), 3);
        assert_eq!(PlanTier::Tier5.required_count(10), 5);
        assert_eq!(PlanTier::All.required_count(10), 10);
        assert_eq!(PlanTier::All.required_count(0), 0);
    }

    #[test]
    fn test_round_trip_through_wire_names() {
        for tier in PlanTier::ALL_TIERS {
            assert_eq!(tier.as_str().parse::<PlanTier>().unwrap(), tier);
            let json = serde_json::to_string(&tier).unwrap();
            assert_eq!(json, format!("\"{}\"", tier.as_str()));
        }
    }

    #[test]
    fn test_rejects_unknown_and_cased_names() {
        assert!("premium".parse::<PlanTier>().is_err());
        assert!("Tier3".parse::<PlanTier>().is_err());
        assert!("".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_paid_tiers() {
        let paid: Vec<_> = PlanTier::ALL_TIERS.into_iter().filter(|t| t.is_paid()).collect();
        assert_eq!(paid, PlanTier::PAID_TIERS);
    }
}
