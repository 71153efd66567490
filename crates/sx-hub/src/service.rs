//! # Metadata Service
//!
//! Wires a store session to the streaming engine. Setup (session, table
//! choice, query execution) happens before the response starts and can
//! fail with a [`HubError`]. After that a producer task owns the cursor
//! and the only way the client learns of trouble is a shorter document.

use std::sync::Arc;

use sx_io::{fragment_channel, pump, ErrorReporter, FragmentStream, TracingReporter};
use tracing::Instrument;

use crate::error::HubError;
use crate::query::{MetadataQuery, MetadataRequest, TableNames};
use crate::store::SessionProvider;

#[derive(Clone)]
pub struct MetadataService {
    provider: Arc<dyn SessionProvider>,
    tables: TableNames,
    stream_buffer: usize,
    reporter: Arc<dyn ErrorReporter>,
}

impl MetadataService {
    pub fn new(provider: Arc<dyn SessionProvider>, tables: TableNames, stream_buffer: usize) -> Self {
        Self {
            provider,
            tables,
            stream_buffer,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Replace the sink for per-row and mid-stream failures.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn store_kind(&self) -> &'static str {
        self.provider.kind()
    }

    /// Start streaming the metadata document for `request`.
    ///
    /// Returns once the query is running. The stream yields the document
    /// in fragments and ends when the producer task is done.
    pub async fn stream_metadata(&self, request: &MetadataRequest) -> Result<FragmentStream, HubError> {
        let session = self.provider.acquire().await?;
        let clustered = session.cluster_name().is_some();
        let query = MetadataQuery::new(request, clustered, &self.tables)?;

        tracing::debug!(
            table = %query.table,
            metric = ?query.metric,
            limit = ?query.limit,
            limit_per_metric = query.limit_per_metric,
            "metadata query prepared"
        );

        let cursor = session.execute(&query).await?;
        // The session is only needed to start the query.
        drop(session);

        let (sink, stream) = fragment_channel(self.stream_buffer);
        let span = tracing::info_span!(
            "metadata_stream",
            request_id = %uuid::Uuid::new_v4(),
            table = %query.table,
        );
        let reporter = Arc::clone(&self.reporter);
        tokio::spawn(async move { pump(cursor, sink, reporter).await }.instrument(span));

        Ok(stream)
    }
}
