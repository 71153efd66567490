//! # sx-hub — SEXTANT Metadata Read API
//!
//! HTTP front of the metadata read path. The binary in `main.rs` only
//! parses flags and config; everything routable lives here so it can be
//! driven in-process by tests.

use std::sync::Arc;
use std::time::Instant;

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod error;
pub mod query;
pub mod service;
pub mod store;

pub use config::{Config, StoreKind};
pub use error::HubError;
pub use service::MetadataService;

pub struct AppState {
    pub metadata: MetadataService,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(metadata: MetadataService) -> Self {
        Self {
            metadata,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/metadata", get(api::metadata))
        .route("/api/status", get(api::status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
