//! Entitlement engine services.
//!
//! # Services
//!
//! - `repair` - Self-healing read path producing the canonical plan view
//! - `legacy` - One-time plan inference for records written before plan tiers
//! - `selection` - Client save path guarded by the lock window
//! - `registration` - Initial record for a new account
//! - `billing` - Merges gateway callbacks and promotes paid users
//! - `checkout` - Prices a plan purchase and opens a gateway session
//!
//! The client save path and the billing reconciler write the same document
//! without any shared lock. Both are idempotent merges, and the repair pass
//! run on every read restores cross-field invariants if a concurrent pair of
//! writes interleaves badly.

pub mod billing;
pub mod checkout;
pub mod legacy;
pub mod registration;
pub mod repair;
pub mod selection;

use thiserror::Error;

use crate::db::RepositoryError;
use crate::gateway::GatewayError;

pub use billing::{BillingReconciler, ReconcileOutcome};
pub use checkout::{CheckoutOutcome, CheckoutRequest, CheckoutService};
pub use registration::RegistrationService;
pub use repair::{Repair, StateRepairLoader, plan_repair};
pub use selection::{SaveOutcome, SelectionService};

/// Errors surfaced by engine operations.
///
/// Malformed stored data is never an error here; it is repaired. A locked
/// selection is not an error either; it is reported through `editable`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The document store failed. Nothing was changed.
    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),

    /// The payment gateway failed or sent something unusable.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The request was rejected before touching stored state.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
