//! # Metadata Query
//!
//! Request normalization and SQL construction for the metadata read path.
//! Callers never get rejected for odd parameters: missing, unparsable or
//! non-positive limits fall back to the defaults below.

pub mod builder;

pub use builder::{build, MetadataQuery, QueryBuildError, TableNames};

use serde::Deserialize;

/// Entries returned per metric when the caller does not say otherwise.
pub const DEFAULT_LIMIT_PER_METRIC: u64 = 1;

/// Raw `/api/v1/metadata` query parameters, kept as strings so that a bad
/// value degrades to the default instead of failing extraction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataParams {
    pub metric: Option<String>,
    pub limit: Option<String>,
    pub limit_per_metric: Option<String>,
}

/// A normalized metadata request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRequest {
    /// Exact, case-sensitive metric name filter.
    pub metric: Option<String>,
    /// Overall row cap. `<= 0` means unbounded.
    pub limit: i64,
    /// Per-metric cap. `<= 0` means [`DEFAULT_LIMIT_PER_METRIC`].
    pub limit_per_metric: i64,
}

impl MetadataRequest {
    pub fn new(metric: Option<&str>, limit: i64, limit_per_metric: i64) -> Self {
        Self {
            metric: metric.filter(|m| !m.is_empty()).map(str::to_string),
            limit,
            limit_per_metric,
        }
    }

    /// Effective overall cap, if any.
    pub fn effective_limit(&self) -> Option<u64> {
        (self.limit > 0).then_some(self.limit as u64)
    }

    /// Effective per-metric cap.
    pub fn effective_limit_per_metric(&self) -> u64 {
        if self.limit_per_metric > 0 {
            self.limit_per_metric as u64
        } else {
            DEFAULT_LIMIT_PER_METRIC
        }
    }
}

impl From<MetadataParams> for MetadataRequest {
    fn from(params: MetadataParams) -> Self {
        Self::new(
            params.metric.as_deref(),
            parse_limit(params.limit.as_deref()),
            parse_limit(params.limit_per_metric.as_deref()),
        )
    }
}

fn parse_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok()).unwrap_or(0)
}
