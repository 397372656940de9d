//! Checkout and gateway callback handlers.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::{AppError, Result, set_sentry_user};
use crate::gateway::{GatewayEvent, signature};
use crate::services::{CheckoutOutcome, CheckoutRequest};
use crate::state::AppState;

/// Callback acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    /// `true` when the event type carries no billing change.
    pub ignored: bool,
}

/// Start a checkout for a paid plan.
#[instrument(skip(state, request))]
pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutOutcome>> {
    set_sentry_user(&request.user_id);
    let outcome = state.checkout().start(&request, Utc::now()).await?;
    Ok(Json(outcome))
}

/// Receive a signed gateway callback.
///
/// The signature is checked against the raw body before anything is parsed,
/// so an unsigned or tampered callback changes nothing.
#[instrument(skip(state, headers, body))]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let now = Utc::now();
    let gateway = &state.config().gateway;

    let header = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::InvalidSignature("Missing signature header".to_string()))?;

    signature::verify(
        &gateway.webhook_secret,
        header,
        &body,
        now,
        gateway.signature_tolerance_secs,
    )?;

    let event = GatewayEvent::from_slice(&body)?;

    let Some((user_id, patch)) = event.to_billing_patch()? else {
        info!(event_id = %event.id, event_type = %event.event_type, "Ignoring gateway event");
        return Ok(Json(WebhookAck {
            received: true,
            ignored: true,
        }));
    };

    set_sentry_user(&user_id);
    let outcome = state.billing().apply(user_id, &patch, now).await?;

    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        user_id = %user_id,
        promoted_to = ?outcome.promoted_to,
        "Processed gateway event"
    );

    Ok(Json(WebhookAck {
        received: true,
        ignored: false,
    }))
}
