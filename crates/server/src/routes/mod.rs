//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                         - Liveness check
//! GET  /health/ready                   - Readiness check (document store reachable)
//!
//! # Users
//! POST /api/users/{user_id}            - Register (creates the initial record)
//! GET  /api/users/{user_id}/plan       - Canonical plan state (repairs drift)
//! PUT  /api/users/{user_id}/selection  - Save module selection
//!
//! # Billing
//! POST /api/billing/checkout           - Open a gateway checkout session
//! POST /api/billing/webhook            - Signed gateway callback
//!
//! # Catalog
//! GET  /api/catalog                    - Module catalog in canonical order
//! ```

pub mod billing;
pub mod catalog;
pub mod users;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the user routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/{user_id}", post(users::register))
        .route("/{user_id}/plan", get(users::plan))
        .route("/{user_id}/selection", put(users::save_selection))
}

/// Create the billing routes router.
pub fn billing_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(billing::checkout))
        .route("/webhook", post(billing::webhook))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/users", user_routes())
        .nest("/api/billing", billing_routes())
        .route("/api/catalog", get(catalog::index))
}

/// Build the full application router with health checks and middleware.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes())
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the document store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
