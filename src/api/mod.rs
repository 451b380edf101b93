//! HTTP frontends: the ingestion RPC endpoint and the query API.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::{ingest_router, query_router};
pub use state::{IngestState, QueryState};
