//! Ingestion RPC handler

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use chrono::Utc;

use crate::api::dto::{BatchWriteRequest, BatchWriteResponse};
use crate::api::error::ApiError;
use crate::api::state::IngestState;

/// RPC method served under `/v1/`.
pub const BATCH_WRITE_METHOD: &str = "logs:batchWrite";

/// POST /v1/logs:batchWrite - Enqueue a batch of entries
///
/// Responds once every entry is queued; never waits on storage and never
/// reports a persistence failure. An entry without a service rejects the
/// whole request before anything is queued.
pub async fn batch_write(
    State(state): State<IngestState>,
    Path(method): Path<String>,
    payload: Result<Json<BatchWriteRequest>, JsonRejection>,
) -> Result<Json<BatchWriteResponse>, ApiError> {
    if method != BATCH_WRITE_METHOD {
        return Err(ApiError::UnknownMethod(method));
    }
    let Json(request) = payload.map_err(|e| ApiError::Malformed(e.body_text()))?;

    if let Some(index) = request
        .entries
        .iter()
        .position(|entry| entry.service.trim().is_empty())
    {
        return Err(ApiError::MissingService { index });
    }

    let received_at = Utc::now();
    let records = request
        .entries
        .into_iter()
        .map(|entry| entry.into_record(received_at));

    let written = state.batcher.submit_many(records).await.map_err(|err| {
        tracing::warn!(submitted = err.submitted, "batch write hit a closed batcher");
        ApiError::from(err)
    })?;

    tracing::debug!(written, "batch write accepted");
    Ok(Json(BatchWriteResponse { written }))
}
