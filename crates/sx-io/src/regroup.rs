//! # Regrouper — Flat Rows to Nested Document
//!
//! Incremental state machine that turns rows ordered by metric name into
//! fragments of
//!
//! ```text
//! {"status":"success","data":{"<metric>":[<entry>,<entry>],"<metric>":[...]}}
//! ```
//!
//! Concatenating every fragment returned by [`Regrouper::feed`] followed by
//! [`Regrouper::finish`] always yields one valid JSON document.
//!
//! # Invariant
//!
//! A group's closing `]` is emitted before anything of the next group.
//! Groups are NOT merged: the input must already be sorted by metric name.
//! Rows `a, b, a` produce the key `"a"` twice.

use sx_core::{DecodeError, MetadataEntry};

use crate::cursor::RawRow;

/// First fragment of every document.
pub const OPENING: &str = r#"{"status":"success","data":{"#;
/// Last fragment of every document.
pub const CLOSING: &str = "}}";

/// Lifecycle of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing emitted yet.
    Idle,
    /// Opening emitted, accepting rows.
    Streaming,
    /// Input exhausted, closing fragments being produced.
    Draining,
    /// Closing emitted. Terminal.
    Done,
}

/// A single row was rejected. Never fatal for the stream.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("metric {metric:?}: {source}")]
    Decode {
        metric: String,
        #[source]
        source: DecodeError,
    },
    #[error("metric {0:?}: empty metadata entry")]
    Empty(String),
}

/// Regrouping state for one response.
#[derive(Debug)]
pub struct Regrouper {
    phase: Phase,
    current: Option<String>,
    pending: Vec<MetadataEntry>,
    groups_emitted: usize,
}

impl Default for Regrouper {
    fn default() -> Self {
        Self::new()
    }
}

impl Regrouper {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            current: None,
            pending: Vec::new(),
            groups_emitted: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of groups whose array has been closed so far.
    pub fn groups_emitted(&self) -> usize {
        self.groups_emitted
    }

    /// Metric whose entries are currently buffered.
    pub fn current_group(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Entries buffered for the current group.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Accept one row and return the fragments it completes.
    ///
    /// A row that fails to decode, or decodes to an empty entry, is
    /// rejected and leaves the state untouched. Rows fed after
    /// [`Regrouper::finish`] are ignored.
    pub fn feed(&mut self, row: RawRow) -> Result<Vec<String>, RowError> {
        if self.phase == Phase::Done || self.phase == Phase::Draining {
            return Ok(Vec::new());
        }

        let entry = MetadataEntry::from_json(&row.metadata_json).map_err(|source| {
            RowError::Decode {
                metric: row.metric_name.clone(),
                source,
            }
        })?;
        if entry.is_empty() {
            return Err(RowError::Empty(row.metric_name));
        }

        let mut out = Vec::new();
        if self.phase == Phase::Idle {
            out.push(OPENING.to_string());
            self.phase = Phase::Streaming;
        }

        if self.current.as_deref() != Some(row.metric_name.as_str()) {
            self.flush(&mut out);
            self.current = Some(row.metric_name);
        }
        self.pending.push(entry);

        Ok(out)
    }

    /// Flush the last group and close the document.
    ///
    /// Safe to call at any point, including before any row was fed and
    /// after a cursor failure. Returns nothing once the document is closed.
    pub fn finish(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        match self.phase {
            Phase::Done => return out,
            Phase::Idle => out.push(OPENING.to_string()),
            Phase::Streaming | Phase::Draining => {}
        }
        self.phase = Phase::Draining;
        self.flush(&mut out);
        out.push(CLOSING.to_string());
        self.phase = Phase::Done;
        out
    }

    fn flush(&mut self, out: &mut Vec<String>) {
        let Some(metric) = self.current.take() else {
            return;
        };

        if self.groups_emitted > 0 {
            out.push(",".to_string());
        }

        let key = serde_json::to_string(&metric).unwrap_or_default();
        out.push(format!("{}:[", key));

        for (i, entry) in self.pending.drain(..).enumerate() {
            if i > 0 {
                out.push(",".to_string());
            }
            out.push(serde_json::to_string(&entry).unwrap_or_default());
        }

        out.push("]".to_string());
        self.groups_emitted += 1;
    }
}
