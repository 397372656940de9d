//! Plan purchase checkout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use studypass_core::{
    BillingPatch, BillingStatus, PaymentMethod, PlanTier, Price, PriceTable, UserId,
};

use super::{BillingReconciler, EngineError};
use crate::gateway::{CheckoutSessionRequest, PaymentGateway};

/// A checkout request as submitted by the client.
///
/// Plan and method stay strings until validated so an unknown value is a
/// clean 400 rather than a body deserialization failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub plan: String,
    pub method: String,
    pub duration_days: u32,
}

/// Where to send the user to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub redirect_url: String,
    pub session_id: String,
    pub price: Price,
}

/// Opens gateway checkout sessions for paid plans.
#[derive(Clone)]
pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
    reconciler: BillingReconciler,
    prices: PriceTable,
    base_url: String,
}

impl CheckoutService {
    /// Create a new checkout service.
    ///
    /// `base_url` is the public site URL the gateway redirects back to.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        reconciler: BillingReconciler,
        prices: PriceTable,
        base_url: &str,
    ) -> Self {
        Self {
            gateway,
            reconciler,
            prices,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Start a checkout.
    ///
    /// The request is validated and priced before the gateway is called, so
    /// a rejected request changes nothing. On success the billing record is
    /// marked `pending` with the new session id.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidRequest` for an unknown plan, method or
    /// duration, `EngineError::Gateway` if the session cannot be opened, or
    /// `EngineError::Storage` if the pending merge fails.
    #[instrument(skip(self, request, now), fields(user_id = %request.user_id))]
    pub async fn start(
        &self,
        request: &CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutOutcome, EngineError> {
        let plan: PlanTier = request
            .plan
            .parse()
            .map_err(|e| EngineError::InvalidRequest(format!("{e}")))?;
        let method: PaymentMethod = request
            .method
            .parse()
            .map_err(|e| EngineError::InvalidRequest(format!("{e}")))?;
        let price = self
            .prices
            .quote(plan, method, request.duration_days)
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;

        let session = self
            .gateway
            .create_checkout_session(&CheckoutSessionRequest {
                user_id: request.user_id,
                plan,
                method,
                duration_days: request.duration_days,
                price,
                success_url: format!("{}/billing/success", self.base_url),
                cancel_url: format!("{}/billing/cancel", self.base_url),
            })
            .await?;

        let pending = BillingPatch {
            method: Some(method),
            status: Some(BillingStatus::Pending),
            current_plan: Some(plan),
            provider_session_id: Some(session.id.clone()),
            ..Default::default()
        };
        self.reconciler.apply(request.user_id, &pending, now).await?;

        info!(
            plan = %plan,
            method = %method,
            duration_days = request.duration_days,
            session_id = %session.id,
            "Started checkout"
        );

        Ok(CheckoutOutcome {
            redirect_url: session.url,
            session_id: session.id,
            price,
        })
    }
}
