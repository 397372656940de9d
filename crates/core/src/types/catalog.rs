//! Learning module catalog.
//!
//! The catalog content is owned by an external provider. StudyPass only
//! relies on the ids and on the order the provider lists them in, which is
//! the canonical order used for every padding and truncation decision.

use core::fmt;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Maximum length of a catalog id.
const MAX_ID_LENGTH: usize = 128;

/// Errors that can occur when parsing a [`CatalogId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogIdError {
    /// The input string is empty or only whitespace.
    #[error("catalog id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("catalog id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// Opaque identifier of a learning module.
///
/// ## Constraints
///
/// - Length: 1-128 characters after trimming
///
/// ## Examples
///
/// ```
/// use studypass_core::CatalogId;
///
/// assert!(CatalogId::parse("algebra-1").is_ok());
/// assert!(CatalogId::parse("   ").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct CatalogId(String);

impl CatalogId {
    /// Parse a catalog id, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed id is empty or longer than 128 characters.
    pub fn parse(s: &str) -> Result<Self, CatalogIdError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CatalogIdError::Empty);
        }
        if s.chars().count() > MAX_ID_LENGTH {
            return Err(CatalogIdError::TooLong { max: MAX_ID_LENGTH });
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CatalogId {
    type Error = CatalogIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CatalogId> for String {
    fn from(id: CatalogId) -> Self {
        id.0
    }
}

impl AsRef<str> for CatalogId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single learning module as listed by the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Module id.
    pub id: CatalogId,
    /// Display title.
    pub title: String,
    /// Optional short description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The ordered module catalog.
///
/// Duplicate ids are dropped at construction; the first listing wins, so the
/// canonical order is always duplicate-free.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CatalogEntry>", into = "Vec<CatalogEntry>")]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build a catalog from the provider's listing.
    #[must_use]
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut seen = HashSet::with_capacity(entries.len());
        let entries = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.id.clone()))
            .collect();
        Self { entries }
    }

    /// Build a title-less catalog from bare ids. Handy for fixtures and tooling.
    #[must_use]
    pub fn from_ids(ids: impl IntoIterator<Item = CatalogId>) -> Self {
        Self::new(
            ids.into_iter()
                .map(|id| CatalogEntry {
                    title: id.to_string(),
                    id,
                    description: None,
                })
                .collect(),
        )
    }

    /// Entries in canonical order.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Ids in canonical order.
    pub fn ids(&self) -> impl Iterator<Item = &CatalogId> {
        self.entries.iter().map(|entry| &entry.id)
    }

    /// The first id in canonical order, if the catalog is not empty.
    #[must_use]
    pub fn first(&self) -> Option<&CatalogId> {
        self.entries.first().map(|entry| &entry.id)
    }

    /// Number of modules in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog lists no modules at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<CatalogEntry>> for Catalog {
    fn from(entries: Vec<CatalogEntry>) -> Self {
        Self::new(entries)
    }
}

impl From<Catalog> for Vec<CatalogEntry> {
    fn from(catalog: Catalog) -> Self {
        catalog.entries
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn id(s: &str) -> CatalogId {
        CatalogId::parse(s).unwrap()
    }

    #[test]
    fn test_catalog_id_trims() {
        assert_eq!(id("  geometry ").as_str(), "geometry");
    }

    #[test]
    fn test_catalog_id_too_long() {
        let long = "x".repeat(129);
        assert_eq!(
            CatalogId::parse(&long),
            Err(CatalogIdError::TooLong { max: 128 })
        );
        assert!(CatalogId::parse(&"x".repeat(128)).is_ok());
    }

    #[test]
    fn test_catalog_id_rejects_empty_in_json() {
        let result: Result<CatalogId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_drops_duplicates_first_wins() {
        let catalog: Catalog = serde_json::from_str(
            r#"[
                {"id": "b", "title": "Biology"},
                {"id": "a", "title": "Algebra"},
                {"id": "b", "title": "Botany"}
            ]"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        let titles: Vec<_> = catalog.entries().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Biology", "Algebra"]);
        assert_eq!(catalog.first(), Some(&id("b")));
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = Catalog::default();
        assert!(catalog.is_empty());
        assert_eq!(catalog.first(), None);
    }
}
