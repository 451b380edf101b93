//! Probe handlers

use axum::http::StatusCode;

/// GET /live
pub async fn live() -> StatusCode {
    StatusCode::OK
}

/// GET /ready
///
/// Storage reachability is checked once at startup; the process does not
/// start serving otherwise, so readiness is unconditional afterwards.
pub async fn ready() -> StatusCode {
    StatusCode::OK
}

/// GET /api/ping
pub async fn ping() -> &'static str {
    tracing::trace!("ping");
    "pong"
}
