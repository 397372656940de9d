//! Type-safe price representation and the checkout price table.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::billing::PaymentMethod;
use super::plan::PlanTier;

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price from an amount in the smallest currency unit.
    #[must_use]
    pub fn from_cents(cents: i64, currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::new(cents, 2), currency_code)
    }

    /// Amount in the smallest currency unit, as payment gateways expect it.
    #[must_use]
    pub fn minor_units(&self) -> i64 {
        (self.amount * Decimal::ONE_HUNDRED)
            .round()
            .try_into()
            .unwrap_or(i64::MAX)
    }
}

/// ISO 4217 codes of the currencies the price list is quoted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
}

impl CurrencyCode {
    /// The ISO code as a string.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
        }
    }
}

/// Currency code the price list is not quoted in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported currency: {0}")]
pub struct ParseCurrencyError(pub String);

impl FromStr for CurrencyCode {
    type Err = ParseCurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            _ => Err(ParseCurrencyError(s.to_string())),
        }
    }
}

/// Reasons a checkout request cannot be priced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    /// Trial and free plans are never sold.
    #[error("plan {0} cannot be purchased")]
    NotPurchasable(PlanTier),
    /// The billing period is not one we sell.
    #[error("unsupported duration: {0} days")]
    UnsupportedDuration(u32),
    /// The method is not offered for this duration.
    #[error("{method} is not available for {duration_days}-day plans")]
    MethodUnavailable {
        method: PaymentMethod,
        duration_days: u32,
    },
}

/// Billing periods offered at checkout, in days.
pub const DURATIONS: [u32; 3] = [30, 90, 365];

/// Fixed price list for paid plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceTable {
    currency: CurrencyCode,
}

impl PriceTable {
    /// Price table in the given currency.
    #[must_use]
    pub const fn new(currency: CurrencyCode) -> Self {
        Self { currency }
    }

    /// Price a checkout request.
    ///
    /// Bank transfers clear too slowly for monthly renewals, so they are only
    /// offered on quarterly and yearly plans.
    ///
    /// # Errors
    ///
    /// Returns a [`QuoteError`] when the plan, duration or method combination
    /// is not sold.
    pub fn quote(
        &self,
        plan: PlanTier,
        method: PaymentMethod,
        duration_days: u32,
    ) -> Result<Price, QuoteError> {
        let monthly_cents: i64 = match plan {
            PlanTier::Tier3 => 999,
            PlanTier::Tier5 => 1499,
            PlanTier::All => 2499,
            PlanTier::Trial | PlanTier::Free => return Err(QuoteError::NotPurchasable(plan)),
        };

        // Longer commitments earn a discount, in percent.
        let (months, discount): (i64, i64) = match duration_days {
            30 => (1, 0),
            90 => (3, 10),
            365 => (12, 20),
            other => return Err(QuoteError::UnsupportedDuration(other)),
        };

        if method == PaymentMethod::BankTransfer && duration_days < 90 {
            return Err(QuoteError::MethodUnavailable {
                method,
                duration_days,
            });
        }

        let cents = monthly_cents * months * (100 - discount) / 100;
        Ok(Price::from_cents(cents, self.currency))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_price() {
        let price = PriceTable::default()
            .quote(PlanTier::Tier3, PaymentMethod::Card, 30)
            .unwrap();
        assert_eq!(price.amount, Decimal::new(999, 2));
        assert_eq!(price.minor_units(), 999);
        assert_eq!(price.currency_code, CurrencyCode::USD);
    }

    #[test]
    fn test_yearly_discount() {
        let price = PriceTable::default()
            .quote(PlanTier::All, PaymentMethod::BankTransfer, 365)
            .unwrap();
        // 24.99 * 12 * 0.8 = 239.904, truncated to cents
        assert_eq!(price.minor_units(), 23990);
    }

    #[test]
    fn test_rejects_unsold_combinations() {
        let table = PriceTable::default();
        assert_eq!(
            table.quote(PlanTier::Trial, PaymentMethod::Card, 30),
            Err(QuoteError::NotPurchasable(PlanTier::Trial))
        );
        assert_eq!(
            table.quote(PlanTier::Tier5, PaymentMethod::Card, 45),
            Err(QuoteError::UnsupportedDuration(45))
        );
        assert!(matches!(
            table.quote(PlanTier::Tier5, PaymentMethod::BankTransfer, 30),
            Err(QuoteError::MethodUnavailable { .. })
        ));
    }

    #[test]
    fn test_currency_codes_parse() {
        assert_eq!("usd".parse::<CurrencyCode>(), Ok(CurrencyCode::USD));
        assert_eq!(" EUR ".parse::<CurrencyCode>(), Ok(CurrencyCode::EUR));
        assert!("GBP".parse::<CurrencyCode>().is_err());
    }

    #[test]
    fn test_every_paid_plan_has_every_duration() {
        let table = PriceTable::new(CurrencyCode::EUR);
        for plan in PlanTier::PAID_TIERS {
            for days in DURATIONS {
                assert!(table.quote(plan, PaymentMethod::Card, days).is_ok());
            }
        }
    }
}
