use crate::record::LogRecord;
use crate::store::{InsertError, LogWriter};
use async_trait::async_trait;

/// A writer that accepts and discards every batch.
///
/// Useful for measuring the overhead of the batcher itself without any
/// external I/O.
#[derive(Clone, Default)]
pub struct NoopStore;

#[async_trait]
impl LogWriter for NoopStore {
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<usize, InsertError> {
        Ok(records.len())
    }
}
