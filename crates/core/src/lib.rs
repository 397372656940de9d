//! StudyPass Core - plan, entitlement and selection rules.
//!
//! This crate holds the pure part of the StudyPass entitlement engine:
//! - `server` - HTTP service, document store, billing reconciliation
//! - `cli` - Migrations and bulk record repair
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Every function here is deterministic given its
//! inputs, which is what makes the read-time repair in `server` converge.
//!
//! # Modules
//!
//! - [`types`] - Plan tiers, catalog ids, billing records, prices
//! - [`entitlement`] - Plan tier to entitlement set
//! - [`selection`] - Selection normalization under per-tier cardinality rules
//! - [`lock`] - Selection change cooldown window

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod entitlement;
pub mod lock;
pub mod selection;
pub mod types;

pub use entitlement::{EntitlementSet, resolve_entitlements};
pub use lock::{LockDecision, add_one_month, schedule_lock};
pub use selection::normalize_selection;
pub use types::*;
