//! Router setup for the two listeners

use axum::{routing::get, routing::post, Router};

use crate::api::handlers;
use crate::api::state::{IngestState, QueryState};

/// Routes served on the ingestion listener.
pub fn ingest_router(state: IngestState) -> Router {
    Router::new()
        // matchit reads ':' as a parameter marker, so the whole
        // `logs:batchWrite` segment is captured and checked by the handler.
        .route("/v1/:method", post(handlers::batch_write))
        .merge(probe_routes())
        .with_state(state)
}

/// Routes served on the query listener.
///
/// Any method other than GET on `/v1/logs` is answered with 405.
pub fn query_router(state: QueryState) -> Router {
    Router::new()
        .route("/v1/logs", get(handlers::query_logs))
        .merge(probe_routes())
        .with_state(state)
}

fn probe_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/live", get(handlers::live))
        .route("/ready", get(handlers::ready))
        .route("/api/ping", get(handlers::ping))
}
