//! Observability seam for per-row and cursor errors.
//!
//! Reporting is fire-and-forget: implementations must not block the
//! producer.

use std::error::Error;

/// Sink for errors the stream recovers from.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, err: &(dyn Error + 'static));
}

/// Default reporter: logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, err: &(dyn Error + 'static)) {
        match err.source() {
            Some(source) => tracing::error!(error = %err, cause = %source, "metadata stream error"),
            None => tracing::error!(error = %err, "metadata stream error"),
        }
    }
}
