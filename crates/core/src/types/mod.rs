//! Core types for StudyPass.
//!
//! This module provides type-safe wrappers for the domain concepts shared by
//! the server and the CLI.

pub mod billing;
pub mod catalog;
pub mod id;
pub mod plan;
pub mod price;

pub use billing::*;
pub use catalog::{Catalog, CatalogEntry, CatalogId, CatalogIdError};
pub use id::*;
pub use plan::{ParsePlanError, PlanTier};
pub use price::{CurrencyCode, ParseCurrencyError, Price, PriceTable, QuoteError};
