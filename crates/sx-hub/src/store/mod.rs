//! # Store Sessions
//!
//! The seam between the metadata service and the time-series store.
//! A [`SessionProvider`] hands out per-request [`Session`]s; a session
//! executes one [`MetadataQuery`] and returns an ordered row cursor.
//!
//! Two implementations:
//! - [`clickhouse::ClickHouseProvider`]: ClickHouse over HTTP.
//! - [`memory::MemoryStore`]: rows held in process, for development and tests.

pub mod clickhouse;
pub mod memory;

use sx_io::RowCursor;

use crate::query::MetadataQuery;

/// Failures that happen before any fragment is streamed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No session could be acquired.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store refused the query.
    #[error("store rejected query (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    /// The store did not answer the request in time.
    #[error("store did not answer within {0:?}")]
    Timeout(std::time::Duration),
    /// Transport failure talking to the store.
    #[error("store transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Hands out sessions. Shared by all requests.
#[async_trait::async_trait]
pub trait SessionProvider: Send + Sync {
    /// Short name for logs and the status endpoint.
    fn kind(&self) -> &'static str;

    /// Acquire a session for one request.
    async fn acquire(&self) -> Result<Box<dyn Session>, StoreError>;
}

/// One request's view of the store.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    /// Cluster this session belongs to, if the store is sharded.
    fn cluster_name(&self) -> Option<&str>;

    /// Execute `query` and return its rows in query order.
    async fn execute(&self, query: &MetadataQuery) -> Result<Box<dyn RowCursor>, StoreError>;
}

/// Normalize a configured cluster name: blank means "not clustered".
pub(crate) fn cluster(name: &str) -> Option<&str> {
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}
