use crate::query::LogQuery;
use crate::record::LogRecord;
use async_trait::async_trait;

/// Destination for flushed batches.
///
/// The batcher calls `insert_batch` from a background task and never awaits
/// it on a producer's behalf. Implementations own their timeout discipline.
#[async_trait]
pub trait LogWriter: Send + Sync {
    /// Insert every record of `records`.
    ///
    /// **Returns**
    /// - `Ok(n)` with `n == records.len()` when the whole batch was stored.
    ///   An empty batch is a no-op that returns `Ok(0)`.
    /// - `Err(InsertError)` otherwise. `written` tells how many records made
    ///   it before the failure; the caller does not try to reconcile the rest.
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<usize, InsertError>;
}

/// Point-in-time read access to stored records.
///
/// Queries never observe records still buffered in the batcher.
#[async_trait]
pub trait LogReader: Send + Sync {
    /// Records matching `query`, newest first, at most `query.limit` of them.
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, StoreError>;
}

/// Failures raised by storage backends.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "clickhouse")]
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode storage response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid timestamp in storage response: {0}")]
    Timestamp(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A batch insert that did not store every record.
#[derive(thiserror::Error, Debug)]
#[error("batch insert stopped after {written} records: {source}")]
pub struct InsertError {
    pub written: usize,
    #[source]
    pub source: StoreError,
}

impl InsertError {
    pub fn new(written: usize, source: StoreError) -> Self {
        Self { written, source }
    }
}
