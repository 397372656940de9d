//! User plan and selection handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use studypass_core::{CatalogId, UserId};

use crate::error::{Result, set_sentry_user};
use crate::models::CanonicalState;
use crate::services::SaveOutcome;
use crate::state::AppState;

/// Registration form.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub display_name: String,
}

/// Requested selection.
///
/// Ids that are not even well-formed are dropped here; everything else is
/// left to normalization.
#[derive(Debug, Deserialize)]
pub struct SelectionBody {
    pub selection: Vec<String>,
}

/// Register a user.
#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<CanonicalState>> {
    set_sentry_user(&user_id);
    let canonical = state
        .registration()
        .register(user_id, &body.display_name, Utc::now())
        .await?;
    Ok(Json(canonical))
}

/// Load a user's canonical plan state.
#[instrument(skip(state))]
pub async fn plan(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<CanonicalState>> {
    set_sentry_user(&user_id);
    let canonical = state.loader().load(user_id, Utc::now()).await?;
    Ok(Json(canonical))
}

/// Save a user's module selection.
///
/// A locked selection answers 200 with `editable: false`.
#[instrument(skip(state, body))]
pub async fn save_selection(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(body): Json<SelectionBody>,
) -> Result<Json<SaveOutcome>> {
    set_sentry_user(&user_id);
    let requested: Vec<CatalogId> = body
        .selection
        .iter()
        .filter_map(|raw| CatalogId::parse(raw).ok())
        .collect();

    let outcome = state
        .selection()
        .save(user_id, &requested, Utc::now())
        .await?;
    Ok(Json(outcome))
}
