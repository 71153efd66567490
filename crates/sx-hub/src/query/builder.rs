//! # Metadata Query Builder
//!
//! Builds the ClickHouse statement for the metadata read path:
//!
//! ```text
//! SELECT JSONExtractString(labels, '__name__') AS metric_name, metadata AS metadata_json
//! FROM qryn.time_series
//! WHERE metadata != '' [AND JSONExtractString(labels, '__name__') = '<metric>']
//! ORDER BY metric_name, updated_at_ns DESC
//! LIMIT <per_metric> BY metric_name
//! [LIMIT <limit>]
//! ```
//!
//! The ORDER BY is what lets the regrouper stream: rows of one metric are
//! contiguous and freshest first. It is not optional.
//!
//! The metric name is not a column. It is extracted from the stored label
//! JSON, and the filter is matched against that extracted value.

use std::sync::OnceLock;

use regex::Regex;

use super::MetadataRequest;

const METRIC_NAME_EXPR: &str = "JSONExtractString(labels, '__name__')";

/// Structural failure while assembling the statement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryBuildError {
    #[error("invalid table identifier: {0:?}")]
    InvalidTable(String),
}

/// Source tables for the two deployment shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    /// Local MergeTree table, used on single-node deployments.
    pub local: String,
    /// Distributed view over the cluster, used when a cluster is configured.
    pub distributed: String,
}

impl TableNames {
    /// Qualify both tables with `database`. An empty database leaves the
    /// names unqualified.
    pub fn new(database: &str, local: &str, distributed: &str) -> Self {
        let qualify = |table: &str| {
            if database.is_empty() {
                table.to_string()
            } else {
                format!("{}.{}", database, table)
            }
        };
        Self {
            local: qualify(local),
            distributed: qualify(distributed),
        }
    }

    pub fn select(&self, clustered: bool) -> &str {
        if clustered {
            &self.distributed
        } else {
            &self.local
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::new("", "time_series", "time_series_dist")
    }
}

/// A fully resolved metadata query.
///
/// Stores receive this instead of bare text: the ClickHouse store sends
/// [`MetadataQuery::to_sql`], the in-memory store evaluates the fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataQuery {
    pub table: String,
    pub metric: Option<String>,
    pub limit_per_metric: u64,
    pub limit: Option<u64>,
}

impl MetadataQuery {
    pub fn new(
        request: &MetadataRequest,
        clustered: bool,
        tables: &TableNames,
    ) -> Result<Self, QueryBuildError> {
        let table = tables.select(clustered);
        if !table_re().is_match(table) {
            return Err(QueryBuildError::InvalidTable(table.to_string()));
        }

        Ok(Self {
            table: table.to_string(),
            metric: request.metric.clone(),
            limit_per_metric: request.effective_limit_per_metric(),
            limit: request.effective_limit(),
        })
    }

    /// Render the statement, without a FORMAT clause.
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SELECT {METRIC_NAME_EXPR} AS metric_name, metadata AS metadata_json \
             FROM {} WHERE metadata != ''",
            self.table
        );

        if let Some(metric) = &self.metric {
            sql.push_str(&format!(" AND {METRIC_NAME_EXPR} = {}", sql_quote(metric)));
        }

        sql.push_str(" ORDER BY metric_name, updated_at_ns DESC");
        sql.push_str(&format!(" LIMIT {} BY metric_name", self.limit_per_metric));

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}

/// Build the statement text for a request.
///
/// `limit` and `limit_per_metric` follow [`MetadataRequest`] semantics:
/// anything `<= 0` means "not given".
pub fn build(
    filter: Option<&str>,
    limit: i64,
    limit_per_metric: i64,
    clustered: bool,
    tables: &TableNames,
) -> Result<String, QueryBuildError> {
    let request = MetadataRequest::new(filter, limit, limit_per_metric);
    Ok(MetadataQuery::new(&request, clustered, tables)?.to_sql())
}

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
            .unwrap_or_else(|e| panic!("table identifier pattern: {e}"))
    })
}

fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
