//! Query API handler

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};

use crate::api::dto::QueryResponse;
use crate::api::error::ApiError;
use crate::api::state::QueryState;
use crate::query::{LogQuery, QueryParams};

/// GET /v1/logs - Filtered point-in-time read
///
/// Parameters are validated before storage is touched. Results are newest
/// first and never include records still buffered for ingestion.
pub async fn query_logs(
    State(state): State<QueryState>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::Malformed(e.body_text()))?;
    let query = LogQuery::from_params(&params).map_err(|err| {
        tracing::debug!(error = %err, "rejected log query");
        ApiError::from(err)
    })?;

    tracing::debug!(
        service = %query.service,
        level = ?query.level,
        user = ?query.user,
        from = %query.from,
        to = %query.to,
        limit = query.limit,
        "querying logs"
    );

    let logs = tokio::time::timeout(state.query_timeout, state.reader.query(&query))
        .await
        .map_err(|_| ApiError::Timeout)?
        .map_err(ApiError::Storage)?;

    tracing::debug!(count = logs.len(), "query completed");
    Ok(Json(QueryResponse {
        count: logs.len(),
        logs,
        query: query.echo(),
    }))
}
