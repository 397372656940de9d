//! Billing sub-record types.
//!
//! The billing record is only ever changed through a [`BillingPatch`]: a
//! field-level merge where absent fields keep their stored value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::plan::PlanTier;

/// Error returned when a billing enum value is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseBillingError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Payment lifecycle status reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    #[default]
    Pending,
    Active,
    PastDue,
    Canceled,
}

/// How the user pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
}

/// Commercial standing of the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Trial,
    Free,
    Premium,
}

macro_rules! wire_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Wire name, as stored in user documents.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = ParseBillingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(ParseBillingError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

wire_enum!(BillingStatus, "billing status", {
    Pending => "pending",
    Active => "active",
    PastDue => "past_due",
    Canceled => "canceled",
});

wire_enum!(PaymentMethod, "payment method", {
    Card => "card",
    BankTransfer => "bank_transfer",
});

wire_enum!(AccountType, "account type", {
    Trial => "trial",
    Free => "free",
    Premium => "premium",
});

/// The billing sub-record of a user document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRecord {
    pub account_type: Option<AccountType>,
    pub method: Option<PaymentMethod>,
    pub status: Option<BillingStatus>,
    pub current_plan: Option<PlanTier>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub provider_session_id: Option<String>,
    pub provider_payment_id: Option<String>,
}

impl BillingRecord {
    /// Apply a patch, keeping every field the patch leaves out.
    #[must_use]
    pub fn merged(&self, patch: &BillingPatch) -> Self {
        Self {
            account_type: patch.account_type.or(self.account_type),
            method: patch.method.or(self.method),
            status: patch.status.or(self.status),
            current_plan: patch.current_plan.or(self.current_plan),
            current_period_end: patch.current_period_end.or(self.current_period_end),
            provider_session_id: patch
                .provider_session_id
                .clone()
                .or_else(|| self.provider_session_id.clone()),
            provider_payment_id: patch
                .provider_payment_id
                .clone()
                .or_else(|| self.provider_payment_id.clone()),
        }
    }

    /// The tier this record entitles the user to, if it reports a paid plan
    /// as active.
    #[must_use]
    pub fn promotion_tier(&self) -> Option<PlanTier> {
        match (self.status, self.current_plan) {
            (Some(BillingStatus::Active), Some(plan)) if plan.is_paid() => Some(plan),
            _ => None,
        }
    }
}

/// A partial billing update carried by one gateway callback.
///
/// Serializes to exactly the fields that are present, which is the shape a
/// field-level merge write needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<AccountType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<PaymentMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BillingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_plan: Option<PlanTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_payment_id: Option<String>,
}

impl BillingPatch {
    /// Whether the patch carries no field at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_absent_fields() {
        let stored = BillingRecord {
            method: Some(PaymentMethod::Card),
            status: Some(BillingStatus::Pending),
            provider_session_id: Some("cs_1".to_string()),
            ..Default::default()
        };
        let patch = BillingPatch {
            status: Some(BillingStatus::Active),
            current_plan: Some(PlanTier::Tier5),
            ..Default::default()
        };

        let merged = stored.merged(&patch);
        assert_eq!(merged.method, Some(PaymentMethod::Card));
        assert_eq!(merged.provider_session_id.as_deref(), Some("cs_1"));
        assert_eq!(merged.status, Some(BillingStatus::Active));
        assert_eq!(merged.current_plan, Some(PlanTier::Tier5));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let patch = BillingPatch {
            status: Some(BillingStatus::Active),
            provider_payment_id: Some("pi_9".to_string()),
            ..Default::default()
        };
        let once = BillingRecord::default().merged(&patch);
        assert_eq!(once.merged(&patch), once);
    }

    #[test]
    fn test_promotion_requires_active_paid_plan() {
        let mut record = BillingRecord {
            status: Some(BillingStatus::Active),
            current_plan: Some(PlanTier::Tier3),
            ..Default::default()
        };
        assert_eq!(record.promotion_tier(), Some(PlanTier::Tier3));

        record.current_plan = Some(PlanTier::Free);
        assert_eq!(record.promotion_tier(), None);

        record.current_plan = Some(PlanTier::All);
        record.status = Some(BillingStatus::PastDue);
        assert_eq!(record.promotion_tier(), None);

        record.status = None;
        assert_eq!(record.promotion_tier(), None);
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let patch = BillingPatch {
            status: Some(BillingStatus::PastDue),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, serde_json::json!({"status": "past_due"}));
        assert!(!patch.is_empty());
        assert!(BillingPatch::default().is_empty());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!("past_due".parse::<BillingStatus>().unwrap(), BillingStatus::PastDue);
        assert_eq!(PaymentMethod::BankTransfer.to_string(), "bank_transfer");
        let err = "refunded".parse::<BillingStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid billing status: refunded");
    }
}
