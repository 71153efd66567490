//! # ClickHouse Store
//!
//! Talks to ClickHouse over its HTTP interface. The statement is POSTed
//! with `FORMAT JSONEachRow` and the chunked response body is read
//! incrementally, one newline-delimited row at a time, so a large result
//! set is never buffered whole.
//!
//! A non-2xx status arrives before any row and is a setup failure. Anything
//! that goes wrong once rows are flowing (connection drop, an exception
//! block appended mid-body by the server) surfaces as a [`CursorError`].
//!
//! `timeout_secs` bounds connecting and waiting for the response head only.
//! The body is read at the pace of the consumer and is never given a
//! deadline.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use sx_io::{CursorError, RawRow, RowCursor};

use super::{Session, SessionProvider, StoreError};
use crate::config::ClickHouseConfig;
use crate::query::MetadataQuery;

/// Shared HTTP client plus connection settings.
pub struct ClickHouseProvider {
    client: reqwest::Client,
    config: Arc<ClickHouseConfig>,
}

impl ClickHouseProvider {
    pub fn new(config: ClickHouseConfig) -> Result<Self, StoreError> {
        reqwest::Url::parse(&config.url)
            .map_err(|e| StoreError::Unavailable(format!("invalid url {:?}: {}", config.url, e)))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Round-trip a trivial query. Used at startup to log reachability.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let resp = send(&self.client, &self.config, "SELECT 1".to_string()).await?;
        if !resp.status().is_success() {
            return Err(rejected(resp, &self.config).await);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionProvider for ClickHouseProvider {
    fn kind(&self) -> &'static str {
        "clickhouse"
    }

    async fn acquire(&self) -> Result<Box<dyn Session>, StoreError> {
        Ok(Box::new(ClickHouseSession {
            client: self.client.clone(),
            config: Arc::clone(&self.config),
        }))
    }
}

struct ClickHouseSession {
    client: reqwest::Client,
    config: Arc<ClickHouseConfig>,
}

#[async_trait::async_trait]
impl Session for ClickHouseSession {
    fn cluster_name(&self) -> Option<&str> {
        super::cluster(&self.config.cluster_name)
    }

    async fn execute(&self, query: &MetadataQuery) -> Result<Box<dyn RowCursor>, StoreError> {
        let sql = format!("{} FORMAT JSONEachRow", query.to_sql());
        tracing::debug!(%sql, "executing metadata query");

        let resp = send(&self.client, &self.config, sql).await?;
        if !resp.status().is_success() {
            return Err(rejected(resp, &self.config).await);
        }

        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| e.to_string()))
            .boxed();
        Ok(Box::new(JsonEachRowCursor::new(body)))
    }
}

fn request(client: &reqwest::Client, config: &ClickHouseConfig, sql: String) -> reqwest::RequestBuilder {
    let mut req = client.post(&config.url).body(sql);
    if !config.database.is_empty() {
        req = req.query(&[("database", config.database.as_str())]);
    }
    if let Some(user) = config.user.as_deref().filter(|u| !u.is_empty()) {
        req = req.basic_auth(user, config.password.as_deref());
    }
    req
}

/// POST `sql` and wait for the response head, within the configured deadline.
async fn send(
    client: &reqwest::Client,
    config: &ClickHouseConfig,
    sql: String,
) -> Result<reqwest::Response, StoreError> {
    let deadline = Duration::from_secs(config.timeout_secs);
    match tokio::time::timeout(deadline, request(client, config, sql).send()).await {
        Ok(resp) => Ok(resp?),
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}

async fn rejected(resp: reqwest::Response, config: &ClickHouseConfig) -> StoreError {
    let status = resp.status().as_u16();
    let deadline = Duration::from_secs(config.timeout_secs);
    let message = match tokio::time::timeout(deadline, resp.text()).await {
        Ok(Ok(text)) => text.trim().to_string(),
        _ => String::new(),
    };
    StoreError::Rejected { status, message }
}

/// One `JSONEachRow` line of the metadata query.
#[derive(Debug, Deserialize)]
struct MetadataRow {
    metric_name: String,
    metadata_json: String,
}

/// Row cursor over a newline-delimited JSON body.
pub struct JsonEachRowCursor {
    body: BoxStream<'static, Result<Vec<u8>, String>>,
    buf: Vec<u8>,
    exhausted: bool,
}

impl JsonEachRowCursor {
    pub fn new(body: BoxStream<'static, Result<Vec<u8>, String>>) -> Self {
        Self {
            body,
            buf: Vec::new(),
            exhausted: false,
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        Some(line)
    }
}

#[async_trait::async_trait]
impl RowCursor for JsonEachRowCursor {
    async fn next_row(&mut self) -> Result<Option<RawRow>, CursorError> {
        loop {
            if let Some(line) = self.take_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return parse_row(&line).map(Some);
            }

            if self.exhausted {
                if self.buf.iter().all(u8::is_ascii_whitespace) {
                    self.buf.clear();
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.buf);
                return parse_row(&rest).map(Some);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(CursorError::Read(e)),
                None => self.exhausted = true,
            }
        }
    }
}

fn parse_row(line: &[u8]) -> Result<RawRow, CursorError> {
    let row: MetadataRow = serde_json::from_slice(line).map_err(|e| {
        let preview: String = String::from_utf8_lossy(line).chars().take(200).collect();
        CursorError::Scan(format!("{}: {}", e, preview))
    })?;
    Ok(RawRow::new(row.metric_name, row.metadata_json))
}
