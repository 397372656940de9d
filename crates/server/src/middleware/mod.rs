//! HTTP middleware stack.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, outermost)
//! 2. `TraceLayer` (request tracing, opens the `request` span)
//! 3. Request ID (records into that span)

pub mod request_id;

pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
