//! HTTP client for the payment gateway API.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway};
use crate::config::GatewayConfig;

/// Request timeout for gateway calls.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// Payment gateway client.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpGateway {
    /// Create a new gateway client.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.api_key.expose_secret());
        let mut auth = HeaderValue::from_str(&auth_value)
            .map_err(|e| GatewayError::Parse(format!("Invalid API key format: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.as_str().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct SessionBody<'a> {
    plan: &'static str,
    method: &'static str,
    duration_days: u32,
    user_id: i32,
    amount: i64,
    currency: &'static str,
    success_url: &'a str,
    cancel_url: &'a str,
    metadata: SessionMetadata,
}

/// Echoed back by the gateway on every event for this session.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionMetadata {
    user_id: String,
    plan: &'static str,
    method: &'static str,
    duration_days: String,
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    #[instrument(skip(self, request), fields(user_id = %request.user_id, plan = %request.plan))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);

        let body = SessionBody {
            plan: request.plan.as_str(),
            method: request.method.as_str(),
            duration_days: request.duration_days,
            user_id: request.user_id.as_i32(),
            amount: request.price.minor_units(),
            currency: request.price.currency_code.code(),
            success_url: &request.success_url,
            cancel_url: &request.cancel_url,
            metadata: SessionMetadata {
                user_id: request.user_id.to_string(),
                plan: request.plan.as_str(),
                method: request.method.as_str(),
                duration_days: request.duration_days.to_string(),
            },
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        debug!(session_id = %session.id, "Created checkout session");

        Ok(session)
    }
}
