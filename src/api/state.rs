//! State shared across HTTP handlers

use std::sync::Arc;
use std::time::Duration;

use crate::batcher::BatcherHandle;
use crate::store::LogReader;

/// Upper bound on a single storage query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// State for the ingestion listener. Holds only the producer side of the
/// batcher.
#[derive(Clone)]
pub struct IngestState {
    pub batcher: BatcherHandle,
}

impl IngestState {
    pub fn new(batcher: BatcherHandle) -> Self {
        Self { batcher }
    }
}

/// State for the query listener. Reads go straight to storage.
#[derive(Clone)]
pub struct QueryState {
    pub reader: Arc<dyn LogReader>,
    pub query_timeout: Duration,
}

impl QueryState {
    pub fn new(reader: Arc<dyn LogReader>) -> Self {
        Self {
            reader,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}
