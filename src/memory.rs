use crate::query::LogQuery;
use crate::record::LogRecord;
use crate::store::{InsertError, LogReader, LogWriter, StoreError};
use async_trait::async_trait;
use std::sync::Mutex;

/// In-process store implementing both the writer and the reader side.
///
/// Backs the `memory://` DSN for local development and is the store used by
/// the HTTP tests. Contents are lost with the process.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `records`.
    pub fn from_records(records: impl IntoIterator<Item = LogRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().collect()),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything stored, in insertion order.
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LogWriter for MemoryStore {
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<usize, InsertError> {
        let mut stored = self.records.lock().map_err(|_| {
            InsertError::new(0, StoreError::Unavailable("memory store lock poisoned".into()))
        })?;
        stored.extend_from_slice(records);
        Ok(records.len())
    }
}

#[async_trait]
impl LogReader for MemoryStore {
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, StoreError> {
        let stored = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;

        let mut hits: Vec<LogRecord> = stored.iter().filter(|r| query.matches(r)).cloned().collect();
        // stable sort keeps insertion order among equal timestamps
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        hits.truncate(query.limit);
        Ok(hits)
    }
}
