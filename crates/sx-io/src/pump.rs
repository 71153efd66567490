//! # Pump — Cursor to Channel Producer
//!
//! Drives one cursor through a [`Regrouper`] and pushes the resulting
//! fragments into the fragment channel. Runs as its own task, concurrently
//! with whoever drains the channel.
//!
//! Exit paths:
//! - cursor exhausted: final flush, `}}`, channel closed.
//! - cursor read failure: same as exhausted; the failure is logged and
//!   reported, the client still receives a valid document.
//! - consumer gone: stop immediately. Nothing left to close for.
//!
//! The cursor and the sender are owned by the pump, so both are released
//! on every path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::channel::FragmentSender;
use crate::cursor::RowCursor;
use crate::regroup::{Regrouper, RowError};
use crate::report::ErrorReporter;

/// Process-wide counters for the status endpoint.
pub static ROWS_STREAMED: AtomicU64 = AtomicU64::new(0);
pub static ROWS_DROPPED: AtomicU64 = AtomicU64::new(0);
pub static STREAMS_TRUNCATED: AtomicU64 = AtomicU64::new(0);

/// How a pump run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Cursor exhausted, document closed.
    Completed,
    /// Cursor failed mid-stream, document closed early.
    CursorFailed,
    /// Consumer hung up, document left unterminated.
    ConsumerGone,
}

/// Summary of one pump run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpReport {
    pub outcome: PumpOutcome,
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub groups_emitted: usize,
}

/// Stream every row of `cursor` into `sink` as one JSON document.
pub async fn pump(
    mut cursor: Box<dyn RowCursor>,
    sink: FragmentSender,
    reporter: Arc<dyn ErrorReporter>,
) -> PumpReport {
    let mut regrouper = Regrouper::new();
    let mut rows_read = 0usize;
    let mut rows_dropped = 0usize;
    let mut outcome = PumpOutcome::Completed;

    loop {
        let row = match cursor.next_row().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    rows_read,
                    "cursor failed mid-stream, closing document early"
                );
                reporter.report(&err);
                STREAMS_TRUNCATED.fetch_add(1, Ordering::Relaxed);
                outcome = PumpOutcome::CursorFailed;
                break;
            }
        };
        rows_read += 1;

        match regrouper.feed(row) {
            Ok(fragments) => {
                if sink.send_all(fragments).await.is_err() {
                    return consumer_gone(rows_read, rows_dropped, &regrouper);
                }
            }
            Err(RowError::Empty(metric)) => {
                tracing::debug!(%metric, "skipping empty metadata entry");
                rows_dropped += 1;
            }
            Err(err) => {
                reporter.report(&err);
                rows_dropped += 1;
            }
        }
    }

    // Store resources are not needed for the closing fragments.
    drop(cursor);

    if sink.send_all(regrouper.finish()).await.is_err() {
        return consumer_gone(rows_read, rows_dropped, &regrouper);
    }

    record(rows_read, rows_dropped);

    tracing::debug!(
        rows_read,
        rows_dropped,
        groups = regrouper.groups_emitted(),
        ?outcome,
        "metadata stream finished"
    );

    PumpReport {
        outcome,
        rows_read,
        rows_dropped,
        groups_emitted: regrouper.groups_emitted(),
    }
}

fn record(rows_read: usize, rows_dropped: usize) {
    ROWS_STREAMED.fetch_add((rows_read - rows_dropped) as u64, Ordering::Relaxed);
    ROWS_DROPPED.fetch_add(rows_dropped as u64, Ordering::Relaxed);
}

fn consumer_gone(rows_read: usize, rows_dropped: usize, regrouper: &Regrouper) -> PumpReport {
    record(rows_read, rows_dropped);
    tracing::info!(rows_read, "client disconnected, abandoning metadata stream");
    PumpReport {
        outcome: PumpOutcome::ConsumerGone,
        rows_read,
        rows_dropped,
        groups_emitted: regrouper.groups_emitted(),
    }
}
