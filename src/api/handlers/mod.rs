//! HTTP request handlers

mod health;
mod ingest;
mod query;

pub use health::{live, ping, ready};
pub use ingest::{batch_write, BATCH_WRITE_METHOD};
pub use query::query_logs;
