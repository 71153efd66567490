//! # Hub Configuration
//!
//! Loaded from a TOML file (`sx-hub.toml` by default). Every field has a
//! default, so a missing file or a partial file is fine. Two environment
//! variables override the file: `SX_CLICKHOUSE_URL` and `SX_CLUSTER_NAME`.
//!
//! ```toml
//! store = "clickhouse"
//!
//! [server]
//! bind = "0.0.0.0:3100"
//! stream_buffer = 64
//!
//! [clickhouse]
//! url = "http://clickhouse:8123"
//! database = "qryn"
//! cluster_name = ""
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::HubError;
use crate::query::TableNames;

pub const ENV_CLICKHOUSE_URL: &str = "SX_CLICKHOUSE_URL";
pub const ENV_CLUSTER_NAME: &str = "SX_CLUSTER_NAME";

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub store: StoreKind,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Which store backs the metadata endpoint.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Clickhouse,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Fragments buffered between the producer and a slow client.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClickHouseConfig {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Empty when ClickHouse runs single-node.
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_dist_table")]
    pub dist_table: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            database: default_database(),
            user: None,
            password: None,
            cluster_name: String::new(),
            table: default_table(),
            dist_table: default_dist_table(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClickHouseConfig {
    pub fn tables(&self) -> TableNames {
        TableNames::new(&self.database, &self.table, &self.dist_table)
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct MemoryConfig {
    /// JSON file of rows to preload.
    #[serde(default)]
    pub seed: Option<PathBuf>,
    /// Act as a cluster member (reads the distributed table name).
    #[serde(default)]
    pub cluster_name: String,
}

fn default_bind() -> String {
    "127.0.0.1:3100".into()
}
fn default_stream_buffer() -> usize {
    64
}
fn default_clickhouse_url() -> String {
    "http://127.0.0.1:8123".into()
}
fn default_database() -> String {
    "qryn".into()
}
fn default_table() -> String {
    "time_series".into()
}
fn default_dist_table() -> String {
    "time_series_dist".into()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Read `path`, or return defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, HubError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| HubError::Config(format!("reading {:?}: {}", path, e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, HubError> {
        toml::from_str(content).map_err(|e| HubError::Config(e.to_string()))
    }

    /// Apply `SX_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_CLICKHOUSE_URL) {
            self.clickhouse.url = url;
        }
        if let Some(cluster) = lookup(ENV_CLUSTER_NAME) {
            self.clickhouse.cluster_name = cluster.clone();
            self.memory.cluster_name = cluster;
        }
    }
}
