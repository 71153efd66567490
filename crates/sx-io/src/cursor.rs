//! # Cursor — Ordered Row Source
//!
//! A [`RowCursor`] yields `(metric_name, metadata_json)` rows in the order
//! the store produced them. The regrouper relies on that order: rows of
//! one metric must be contiguous.
//!
//! A cursor owns its store resources. Dropping it releases them, so every
//! exit path of the producer (end of rows, read failure, consumer gone)
//! releases the cursor without an explicit `close()`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One undecoded row as scanned from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// Group key, extracted store-side from the label payload.
    pub metric_name: String,
    /// Stored metadata payload, still JSON text.
    pub metadata_json: String,
}

impl RawRow {
    pub fn new(metric_name: impl Into<String>, metadata_json: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            metadata_json: metadata_json.into(),
        }
    }
}

/// A cursor-level failure. Terminal for the stream it occurs in.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    /// The store connection failed mid-stream.
    #[error("store read failed: {0}")]
    Read(String),
    /// A row could not be scanned into the two expected columns.
    #[error("row scan failed: {0}")]
    Scan(String),
}

/// Ordered source of rows for a single query.
#[async_trait::async_trait]
pub trait RowCursor: Send {
    /// Advance to the next row.
    ///
    /// `Ok(None)` means the result set is exhausted. After an error or
    /// `Ok(None)` the cursor must not be polled again.
    async fn next_row(&mut self) -> Result<Option<RawRow>, CursorError>;
}

/// In-memory cursor over a pre-ordered list of rows.
///
/// Backs the in-memory store and the tests. It can be told to fail after a
/// number of rows to simulate a store connection dropping mid-stream.
pub struct VecCursor {
    rows: VecDeque<RawRow>,
    fail_after: Option<usize>,
    served: usize,
    released: Option<Arc<AtomicBool>>,
}

impl VecCursor {
    pub fn new(rows: impl IntoIterator<Item = RawRow>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
            fail_after: None,
            served: 0,
            released: None,
        }
    }

    /// Return a read error once `rows` rows have been served.
    pub fn failing_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }

    /// Set `flag` when the cursor is dropped.
    pub fn track_release(mut self, flag: Arc<AtomicBool>) -> Self {
        self.released = Some(flag);
        self
    }

    /// Rows not yet served.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

#[async_trait::async_trait]
impl RowCursor for VecCursor {
    async fn next_row(&mut self) -> Result<Option<RawRow>, CursorError> {
        if let Some(limit) = self.fail_after {
            if self.served >= limit {
                return Err(CursorError::Read(format!(
                    "connection reset after {} rows",
                    self.served
                )));
            }
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.served += 1;
        }
        Ok(row)
    }
}

impl Drop for VecCursor {
    fn drop(&mut self) {
        if let Some(flag) = &self.released {
            flag.store(true, Ordering::SeqCst);
        }
    }
}
