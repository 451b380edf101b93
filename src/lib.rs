pub mod record;
pub mod store;
pub mod query;
pub mod batcher;

pub mod memory;
pub mod noop;

#[cfg(feature = "clickhouse")]
pub mod clickhouse;

pub mod backend;
pub mod config;
pub mod init;
pub mod api;

pub use batcher::{Batcher, BatcherConfig, BatcherHandle, BatcherStats, DeliveryPolicy};
pub use record::LogRecord;
pub use store::{InsertError, LogReader, LogWriter, StoreError};
