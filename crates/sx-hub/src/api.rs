//! # API Handlers
//!
//! `/api/v1/metadata` streams the Prometheus-compatible metadata document.
//! `/api/status` reports what the hub is backed by and how much it has
//! streamed.

use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;

use crate::error::HubError;
use crate::query::{MetadataParams, MetadataRequest};
use crate::AppState;

// =============================================================================
// Metadata
// =============================================================================

pub async fn metadata(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MetadataParams>,
) -> Result<Response, HubError> {
    let request = MetadataRequest::from(params);
    let fragments = state.metadata.stream_metadata(&request).await?;

    let body = Body::from_stream(fragments.map(Ok::<_, Infallible>));
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

// =============================================================================
// Status
// =============================================================================

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub store: &'static str,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub rows_streamed: u64,
    pub rows_dropped: u64,
    pub streams_truncated: u64,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        store: state.metadata.store_kind(),
        started_at: state.started_at,
        uptime_secs: state.start_time.elapsed().as_secs(),
        rows_streamed: sx_io::pump::ROWS_STREAMED.load(Ordering::Relaxed),
        rows_dropped: sx_io::pump::ROWS_DROPPED.load(Ordering::Relaxed),
        streams_truncated: sx_io::pump::STREAMS_TRUNCATED.load(Ordering::Relaxed),
    })
}
