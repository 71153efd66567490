//! # In-Memory Store
//!
//! Holds series rows the way the `time_series` table does (label JSON,
//! metadata JSON, update timestamp) and evaluates a [`MetadataQuery`]
//! with the same semantics as the generated SQL: non-empty metadata,
//! metric filter, ordering, per-metric limit, overall limit.
//!
//! Local and distributed tables read the same rows. Executed statements
//! are recorded so callers can see which table was chosen.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Deserialize;
use sx_core::{is_metadata_label, MetadataEntry};
use sx_io::{RawRow, RowCursor, VecCursor};

use super::{Session, SessionProvider, StoreError};
use crate::query::MetadataQuery;

/// One stored series row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSeries {
    /// Label set as JSON text, e.g. `{"__name__":"up","job":"api"}`.
    pub labels: String,
    /// Encoded [`MetadataEntry`], or `""` when the series carried none.
    pub metadata: String,
    pub updated_at_ns: u64,
}

impl StoredSeries {
    /// Build a row the way the write path would: reserved `__metric_*__`
    /// labels become the metadata payload and are removed from the label set.
    pub fn from_labels(labels: &[(&str, &str)], updated_at_ns: u64) -> Self {
        let entry = MetadataEntry::from_labels(labels.iter().copied());
        let identity: BTreeMap<&str, &str> = labels
            .iter()
            .copied()
            .filter(|(name, _)| !is_metadata_label(name))
            .collect();
        Self {
            labels: serde_json::to_string(&identity).unwrap_or_default(),
            metadata: entry.to_json().unwrap_or_default(),
            updated_at_ns,
        }
    }

    /// Equivalent of `JSONExtractString(labels, '__name__')`: empty when the
    /// labels are not JSON or carry no string `__name__`.
    pub fn metric_name(&self) -> String {
        serde_json::from_str::<serde_json::Value>(&self.labels)
            .ok()
            .and_then(|v| v.get("__name__").and_then(|n| n.as_str()).map(String::from))
            .unwrap_or_default()
    }
}

/// Seed file row: `{"labels": {...}, "metadata": {...}, "updated_at_ns": 1}`.
/// When `metadata` is absent it is derived from the reserved labels.
#[derive(Debug, Deserialize)]
struct SeedRow {
    labels: BTreeMap<String, String>,
    #[serde(default)]
    metadata: Option<MetadataEntry>,
    #[serde(default)]
    updated_at_ns: u64,
}

impl From<SeedRow> for StoredSeries {
    fn from(seed: SeedRow) -> Self {
        let pairs: Vec<(&str, &str)> = seed
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let mut series = StoredSeries::from_labels(&pairs, seed.updated_at_ns);
        if let Some(entry) = seed.metadata {
            series.metadata = entry.to_json().unwrap_or_default();
        }
        series
    }
}

/// Process-local store. Clones share the same rows.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: RwLock<Vec<StoredSeries>>,
    cluster_name: Option<String>,
    unavailable: AtomicBool,
    fail_after: Mutex<Option<usize>>,
    executed: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend to be part of `cluster`, so queries target the distributed
    /// table. A blank name means "not clustered".
    pub fn with_cluster(cluster: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                cluster_name: super::cluster(cluster).map(String::from),
                ..Inner::default()
            }),
        }
    }

    /// Load rows from a JSON array of seed rows.
    pub fn load_seed(&self, path: &Path) -> Result<usize, StoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Unavailable(format!("reading seed {:?}: {}", path, e)))?;
        let seeds: Vec<SeedRow> = serde_json::from_str(&content)
            .map_err(|e| StoreError::Unavailable(format!("parsing seed {:?}: {}", path, e)))?;
        let count = seeds.len();
        self.insert(seeds.into_iter().map(StoredSeries::from));
        Ok(count)
    }

    pub fn insert(&self, rows: impl IntoIterator<Item = StoredSeries>) {
        self.inner
            .rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(rows);
    }

    pub fn len(&self) -> usize {
        self.inner.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make [`SessionProvider::acquire`] fail while `false`.
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make cursors fail after `rows` rows. `None` restores normal reads.
    pub fn fail_reads_after(&self, rows: Option<usize>) {
        *self
            .inner
            .fail_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = rows;
    }

    /// Statements executed so far, oldest first.
    pub fn executed(&self) -> Vec<String> {
        self.inner
            .executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Evaluate `query` against the stored rows.
    pub fn evaluate(&self, query: &MetadataQuery) -> Vec<RawRow> {
        let rows = self
            .inner
            .rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut matched: Vec<(String, StoredSeries)> = rows
            .into_iter()
            .filter(|row| !row.metadata.is_empty())
            .map(|row| (row.metric_name(), row))
            .filter(|(name, _)| query.metric.as_ref().map_or(true, |m| m == name))
            .collect();

        // ORDER BY metric_name, updated_at_ns DESC
        matched.sort_by(|(a_name, a), (b_name, b)| {
            a_name
                .cmp(b_name)
                .then_with(|| b.updated_at_ns.cmp(&a.updated_at_ns))
        });

        // LIMIT n BY metric_name
        let mut out: Vec<RawRow> = Vec::new();
        let mut taken = 0u64;
        let mut previous: Option<String> = None;
        for (name, row) in matched {
            if previous.as_deref() != Some(name.as_str()) {
                previous = Some(name.clone());
                taken = 0;
            }
            if taken >= query.limit_per_metric {
                continue;
            }
            taken += 1;
            out.push(RawRow::new(name, row.metadata));
        }

        // LIMIT n
        if let Some(limit) = query.limit {
            out.truncate(limit as usize);
        }
        out
    }
}

#[async_trait::async_trait]
impl SessionProvider for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn acquire(&self) -> Result<Box<dyn Session>, StoreError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".into(),
            ));
        }
        Ok(Box::new(MemorySession {
            store: self.clone(),
        }))
    }
}

struct MemorySession {
    store: MemoryStore,
}

#[async_trait::async_trait]
impl Session for MemorySession {
    fn cluster_name(&self) -> Option<&str> {
        self.store.inner.cluster_name.as_deref()
    }

    async fn execute(&self, query: &MetadataQuery) -> Result<Box<dyn RowCursor>, StoreError> {
        self.store
            .inner
            .executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_sql());
        let rows = self.store.evaluate(query);
        let mut cursor = VecCursor::new(rows);
        let fail_after = *self
            .store
            .inner
            .fail_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(n) = fail_after {
            cursor = cursor.failing_after(n);
        }
        Ok(Box::new(cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{MetadataRequest, TableNames};

    fn series(name: &str, help: &str, ts: u64) -> StoredSeries {
        StoredSeries::from_labels(
            &[
                ("__name__", name),
                ("job", "api"),
                ("__metric_type__", "counter"),
                ("__metric_help__", help),
            ],
            ts,
        )
    }

    fn query(metric: Option<&str>, limit: i64, per: i64) -> MetadataQuery {
        let req = MetadataRequest::new(metric, limit, per);
        MetadataQuery::new(&req, false, &TableNames::default()).unwrap()
    }

    fn helps(rows: &[RawRow]) -> Vec<String> {
        rows.iter()
            .map(|r| MetadataEntry::from_json(&r.metadata_json).unwrap().help)
            .collect()
    }

    #[test]
    fn test_from_labels_strips_metadata_labels() {
        let s = series("up", "Is up", 1);
        assert_eq!(s.labels, r#"{"__name__":"up","job":"api"}"#);
        assert_eq!(s.metadata, r#"{"type":"counter","help":"Is up","unit":""}"#);
        assert_eq!(s.metric_name(), "up");
    }

    #[test]
    fn test_metric_name_of_garbage_labels_is_empty() {
        let s = StoredSeries {
            labels: "nope".into(),
            metadata: String::new(),
            updated_at_ns: 0,
        };
        assert_eq!(s.metric_name(), "");
    }

    #[test]
    fn test_evaluate_orders_by_name_then_freshness() {
        let store = MemoryStore::new();
        store.insert(vec![
            series("b", "b-old", 1),
            series("a", "a-old", 1),
            series("b", "b-new", 9),
            series("a", "a-new", 5),
        ]);
        let rows = store.evaluate(&query(None, 0, 10));
        assert_eq!(helps(&rows), vec!["a-new", "a-old", "b-new", "b-old"]);
    }

    #[test]
    fn test_evaluate_applies_limit_by_then_limit() {
        let store = MemoryStore::new();
        store.insert((0..3).flat_map(|i| vec![series("a", "a", i), series("b", "b", i)]));
        assert_eq!(store.evaluate(&query(None, 0, 0)).len(), 2);
        assert_eq!(store.evaluate(&query(None, 0, 2)).len(), 4);
        assert_eq!(store.evaluate(&query(None, 3, 2)).len(), 3);
    }

    #[test]
    fn test_evaluate_skips_rows_without_metadata_and_filters() {
        let store = MemoryStore::new();
        store.insert(vec![
            StoredSeries::from_labels(&[("__name__", "bare")], 1),
            series("http_requests_total", "reqs", 1),
            series("other", "o", 1),
        ]);
        let rows = store.evaluate(&query(None, 0, 0));
        assert_eq!(rows.len(), 2);
        let rows = store.evaluate(&query(Some("http_requests_total"), 0, 0));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].metric_name, "http_requests_total");
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_acquire() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.acquire().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_session_records_statements_and_reports_cluster() {
        let store = MemoryStore::with_cluster("main");
        let session = store.acquire().await.unwrap();
        assert_eq!(session.cluster_name(), Some("main"));
        session.execute(&query(None, 0, 0)).await.unwrap();
        assert_eq!(store.executed().len(), 1);
    }

    #[test]
    fn test_load_seed_file() {
        let path = std::env::temp_dir().join(format!("sx-seed-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[
                {"labels": {"__name__": "up", "__metric_type__": "gauge"}, "updated_at_ns": 2},
                {"labels": {"__name__": "up"}, "metadata": {"type": "gauge", "help": "explicit"}},
                {"labels": {"__name__": "bare"}}
            ]"#,
        )
        .unwrap();

        let store = MemoryStore::new();
        let loaded = store.load_seed(&path);
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.unwrap(), 3);
        let rows = store.evaluate(&query(None, 0, 5));
        assert_eq!(rows.len(), 2);
        assert_eq!(helps(&rows), vec!["", "explicit"]);
    }

    #[test]
    fn test_load_seed_missing_file_is_unavailable() {
        let store = MemoryStore::new();
        let err = store
            .load_seed(Path::new("/definitely/not/here/seed.json"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_poisoned_locks_still_apply_rows_and_failures() {
        let store = MemoryStore::new();
        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _rows = poisoner.inner.rows.write().unwrap();
            let _fail = poisoner.inner.fail_after.lock().unwrap();
            panic!("poison both locks");
        })
        .join();
        assert!(store.inner.rows.is_poisoned());

        store.insert(vec![series("a", "a", 1), series("b", "b", 1)]);
        store.fail_reads_after(Some(1));
        assert_eq!(store.len(), 2);

        let session = store.acquire().await.unwrap();
        let mut cursor = session.execute(&query(None, 0, 0)).await.unwrap();
        assert!(cursor.next_row().await.unwrap().is_some());
        assert!(cursor.next_row().await.is_err());
    }

    #[test]
    fn test_blank_cluster_is_not_clustered() {
        let store = MemoryStore::with_cluster("  ");
        assert!(store.inner.cluster_name.is_none());
    }
}
