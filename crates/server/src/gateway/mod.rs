//! Payment gateway integration.
//!
//! # Outbound
//!
//! [`PaymentGateway::create_checkout_session`] opens a hosted checkout page
//! and returns its redirect URL. [`HttpGateway`] is the production client.
//!
//! # Inbound
//!
//! The gateway reports payment progress by POSTing signed events. Every
//! callback goes through [`signature::verify`] before its body is parsed into
//! a [`GatewayEvent`], which [`GatewayEvent::to_billing_patch`] turns into a
//! billing merge.

mod client;
pub mod events;
pub mod signature;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use studypass_core::{PaymentMethod, PlanTier, Price, UserId};

pub use client::HttpGateway;
pub use events::{EventKind, GatewayEvent};

/// Errors that can occur when talking to the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// A callback failed signature verification.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// A callback was authentic but unusable.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Failed to parse response.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Everything the gateway needs to open a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub user_id: UserId,
    pub plan: PlanTier,
    pub method: PaymentMethod,
    pub duration_days: u32,
    pub price: Price,
    pub success_url: String,
    pub cancel_url: String,
}

/// A hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Gateway session id, echoed back in `checkout.session.completed`.
    pub id: String,
    /// Where to send the user to pay.
    pub url: String,
}

/// Outbound payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout session.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;
}
