//! Domain models for the StudyPass server.
//!
//! These types sit between the raw stored documents and the HTTP layer.

pub mod user;

pub use user::{CURRENT_SCHEMA_VERSION, CanonicalState, StoredUser};
