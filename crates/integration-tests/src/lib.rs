//! Integration tests for StudyPass.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p studypass-integration-tests
//! ```
//!
//! Tests drive the full axum router in process with `tower::ServiceExt::oneshot`,
//! backed by the in-memory document store and a recording payment gateway.
//! No database or network access is needed.
//!
//! # Test Categories
//!
//! - `plan_flow` - Registration, plan reads, selection saves and the lock window
//! - `billing_webhook` - Signed callbacks, promotion and redelivery

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

use studypass_core::{Catalog, CatalogId, CurrencyCode};
use studypass_server::config::{
    DEFAULT_SIGNATURE_TOLERANCE_SECS, GatewayConfig, StoreBackend, StudyPassConfig,
};
use studypass_server::db::MemoryDocumentStore;
use studypass_server::gateway::{
    CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway, signature,
};
use studypass_server::routes;
use studypass_server::state::AppState;

/// Webhook secret shared by the test app and signed test callbacks.
pub const WEBHOOK_SECRET: &str = "whsec_Q8v2LmZ7pX4kR9tN1bW6yH3c";

/// Largest response body the helpers will read.
const MAX_BODY: usize = 1024 * 1024;

/// Payment gateway that records every session request.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sessions: Mutex<Vec<CheckoutSessionRequest>>,
}

impl RecordingGateway {
    /// Session requests received so far.
    pub fn sessions(&self) -> Vec<CheckoutSessionRequest> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.push(request.clone());
        let id = format!("cs_test_{}", sessions.len());
        Ok(CheckoutSession {
            url: format!("https://pay.gateway.test/{id}"),
            id,
        })
    }
}

/// An in-process StudyPass server.
pub struct TestApp {
    pub store: Arc<MemoryDocumentStore>,
    pub gateway: Arc<RecordingGateway>,
    router: Router,
}

impl TestApp {
    /// Build an app over a catalog of bare module ids.
    ///
    /// # Panics
    ///
    /// Panics if a fixture id or URL is invalid.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn new(catalog_ids: &[&str]) -> Self {
        let catalog = Catalog::from_ids(catalog_ids.iter().map(|id| CatalogId::parse(id).unwrap()));
        let store = Arc::new(MemoryDocumentStore::new());
        let gateway = Arc::new(RecordingGateway::default());

        let config = StudyPassConfig {
            store: StoreBackend::Memory,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            base_url: Url::parse("https://studypass.test").unwrap(),
            catalog_path: PathBuf::from("catalog.json"),
            currency: CurrencyCode::USD,
            gateway: GatewayConfig {
                api_base_url: Url::parse("https://api.gateway.test").unwrap(),
                api_key: SecretString::from("sk_test_aB3xY9mK2nL5pQ7rT0uW4zC6".to_string()),
                webhook_secret: SecretString::from(WEBHOOK_SECRET.to_string()),
                signature_tolerance_secs: DEFAULT_SIGNATURE_TOLERANCE_SECS,
            },
            sentry_dsn: None,
            sentry_environment: None,
        };

        let state = AppState::new(config, store.clone(), catalog, gateway.clone());

        Self {
            store,
            gateway,
            router: routes::app(state),
        }
    }

    /// Send a request with an optional JSON body, returning status and JSON body.
    ///
    /// Non-JSON response bodies come back as a JSON string.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    #[allow(clippy::unwrap_used)]
    pub async fn send(&self, method: Method, uri: &str, body: Option<&Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.dispatch(request).await
    }

    /// Post a gateway callback with the given signature header, if any.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    #[allow(clippy::unwrap_used)]
    pub async fn post_webhook(&self, body: &[u8], signature: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/billing/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(value) = signature {
            builder = builder.header(signature::SIGNATURE_HEADER, value);
        }
        self.dispatch(builder.body(Body::from(body.to_vec())).unwrap())
            .await
    }

    /// Post a callback signed with the shared webhook secret.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    #[allow(clippy::unwrap_used)]
    pub async fn post_signed_webhook(&self, event: &Value) -> (StatusCode, Value) {
        let body = event.to_string();
        let header = sign(body.as_bytes(), Utc::now().timestamp()).unwrap();
        self.post_webhook(body.as_bytes(), Some(&header)).await
    }

    #[allow(clippy::unwrap_used)]
    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), MAX_BODY).await.unwrap();
        let json = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, json)
    }
}

/// Sign a callback body with the shared webhook secret.
///
/// # Errors
///
/// Returns `GatewayError` if the MAC cannot be keyed.
pub fn sign(body: &[u8], timestamp: i64) -> Result<String, GatewayError> {
    signature::sign(&SecretString::from(WEBHOOK_SECRET.to_string()), timestamp, body)
}

/// A gateway event as the gateway would send it.
#[must_use]
pub fn gateway_event(event_type: &str, object: &Value) -> Value {
    serde_json::json!({
        "id": format!("evt_{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()),
        "type": event_type,
        "created": Utc::now().timestamp(),
        "data": {"object": object}
    })
}
