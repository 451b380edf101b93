//! API error response types

use crate::api::dto::ErrorResponse;
use crate::batcher::SubmitManyError;
use crate::query::QueryError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidQuery(#[from] QueryError),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("entry {index}: service must not be empty")]
    MissingService { index: usize },

    #[error("ingestion is shutting down, {submitted} entries were accepted")]
    Closed { submitted: usize },

    /// Detail is logged, never returned to the caller.
    #[error("internal server error")]
    Storage(#[source] StoreError),

    #[error("query timed out")]
    Timeout,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidQuery(_)
            | ApiError::Malformed(_)
            | ApiError::MissingService { .. } => StatusCode::BAD_REQUEST,
            ApiError::UnknownMethod(_) => StatusCode::NOT_FOUND,
            ApiError::Closed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidQuery(QueryError::MissingParameter(_)) => "MISSING_PARAMETER",
            ApiError::InvalidQuery(QueryError::InvalidTimestamp(_)) => "INVALID_TIMESTAMP",
            ApiError::InvalidQuery(QueryError::InvalidLimit) => "INVALID_LIMIT",
            ApiError::InvalidQuery(QueryError::InvalidRange) => "INVALID_RANGE",
            ApiError::Malformed(_) => "MALFORMED_REQUEST",
            ApiError::UnknownMethod(_) => "UNKNOWN_METHOD",
            ApiError::MissingService { .. } => "MISSING_SERVICE",
            ApiError::Closed { .. } => "INGEST_CLOSED",
            ApiError::Storage(_) => "STORAGE_ERROR",
            ApiError::Timeout => "QUERY_TIMEOUT",
        }
    }
}

impl From<SubmitManyError> for ApiError {
    fn from(err: SubmitManyError) -> Self {
        ApiError::Closed {
            submitted: err.submitted,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let ApiError::Storage(source) = &self {
            tracing::error!(error = %source, "storage query failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.error_code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::SubmitError;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_range_is_bad_request() {
        let response = ApiError::from(QueryError::InvalidRange).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["code"], "INVALID_RANGE");
        assert_eq!(
            json["error"],
            "invalid time range: 'from' must not be after 'to'"
        );
    }

    #[tokio::test]
    async fn test_storage_detail_is_hidden() {
        let err = ApiError::Storage(StoreError::Unavailable("10.0.0.7 refused".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "internal server error");
        assert_eq!(json["code"], "STORAGE_ERROR");
    }

    #[tokio::test]
    async fn test_closed_is_unavailable() {
        let err = ApiError::from(SubmitManyError {
            submitted: 3,
            source: SubmitError::Closed,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["code"], "INGEST_CLOSED");
    }
}
