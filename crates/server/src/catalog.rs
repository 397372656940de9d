//! Catalog loading.
//!
//! The catalog is a JSON array of `{id, title, description?}` objects. Its
//! listing order is the canonical order used for padding and truncation, so
//! it is loaded once at startup and never re-sorted.

use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use studypass_core::Catalog;

/// Errors loading the catalog file.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("catalog {0} is empty")]
    Empty(String),
}

/// Load the catalog from a JSON file.
///
/// # Errors
///
/// Returns `CatalogError` if the file cannot be read or parsed, or lists no
/// modules.
pub async fn load_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let display = path.display().to_string();

    let raw = tokio::fs::read(path).await.map_err(|source| CatalogError::Io {
        path: display.clone(),
        source,
    })?;

    parse_catalog(&raw, &display)
}

fn parse_catalog(raw: &[u8], path: &str) -> Result<Catalog, CatalogError> {
    let listed: Vec<serde_json::Value> =
        serde_json::from_slice(raw).map_err(|source| CatalogError::Parse {
            path: path.to_string(),
            source,
        })?;
    let listed_len = listed.len();

    let catalog: Catalog = serde_json::from_value(serde_json::Value::Array(listed))
        .map_err(|source| CatalogError::Parse {
            path: path.to_string(),
            source,
        })?;

    if catalog.is_empty() {
        return Err(CatalogError::Empty(path.to_string()));
    }
    if catalog.len() < listed_len {
        warn!(
            path,
            listed = listed_len,
            kept = catalog.len(),
            "Catalog lists duplicate module ids, keeping first occurrence"
        );
    }

    info!(path, modules = catalog.len(), "Catalog loaded");
    Ok(catalog)
}
