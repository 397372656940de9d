//! Catalog listing.

use axum::{Json, extract::State};

use studypass_core::CatalogEntry;

use crate::state::AppState;

/// List the catalog in canonical order.
pub async fn index(State(state): State<AppState>) -> Json<Vec<CatalogEntry>> {
    Json(state.catalog().entries().to_vec())
}
