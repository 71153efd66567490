//! # sx-core — The "Atoms" of SEXTANT
//!
//! Defines the unit of metric metadata that flows through the system:
//! the [`MetadataEntry`]. The write path derives an entry from reserved
//! labels and stores it as a JSON string next to the series; the read
//! path decodes that string back and regroups entries by metric name.
//!
//! Both directions share the helpers in this crate so that the stored
//! payload and the streamed payload are byte-for-byte the same shape:
//!
//! ```text
//! {"type":"counter","help":"Total requests","unit":"requests"}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reserved label carrying the metric type (counter, gauge, histogram, ...).
pub const METRIC_TYPE_LABEL: &str = "__metric_type__";
/// Reserved label carrying the metric help text.
pub const METRIC_HELP_LABEL: &str = "__metric_help__";
/// Reserved label carrying the metric unit.
pub const METRIC_UNIT_LABEL: &str = "__metric_unit__";

/// Reporting semantics of a single metric.
///
/// An entry is *empty* when all three fields are empty. Empty entries are
/// never persisted ([`MetadataEntry::to_json`] yields `""` for them) and the
/// read path treats them as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataEntry {
    /// counter, gauge, histogram, summary, untyped.
    #[serde(rename = "type")]
    pub kind: String,
    pub help: String,
    pub unit: String,
}

/// A stored metadata payload could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("failed to unmarshal metadata: {source}")]
pub struct DecodeError {
    #[from]
    source: serde_json::Error,
}

/// An entry could not be encoded for storage.
#[derive(Debug, thiserror::Error)]
#[error("failed to marshal metadata: {source}")]
pub struct EncodeError {
    #[from]
    source: serde_json::Error,
}

// =============================================================================
// Construction helpers
// =============================================================================

impl MetadataEntry {
    pub fn new(kind: impl Into<String>, help: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            help: help.into(),
            unit: unit.into(),
        }
    }

    /// Returns `true` if no metadata field is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() && self.help.is_empty() && self.unit.is_empty()
    }

    /// Build an entry from the reserved `__metric_*__` labels of a series.
    ///
    /// Non-metadata labels are ignored. Returns an empty entry when none of
    /// the reserved labels is present; later occurrences win.
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut entry = Self::default();
        for (name, value) in labels {
            match name {
                METRIC_TYPE_LABEL => entry.kind = value.to_string(),
                METRIC_HELP_LABEL => entry.help = value.to_string(),
                METRIC_UNIT_LABEL => entry.unit = value.to_string(),
                _ => {}
            }
        }
        entry
    }

    /// Encode for storage. Empty entries encode to an empty string so the
    /// store-side `metadata != ''` predicate filters them out.
    pub fn to_json(&self) -> Result<String, EncodeError> {
        if self.is_empty() {
            return Ok(String::new());
        }
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored payload.
    pub fn from_json(payload: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Returns `true` for the reserved labels that carry metadata rather than
/// series identity.
#[inline]
pub fn is_metadata_label(name: &str) -> bool {
    matches!(
        name,
        METRIC_TYPE_LABEL | METRIC_HELP_LABEL | METRIC_UNIT_LABEL
    )
}

// =============================================================================
// Response document
// =============================================================================

/// Fully materialized `/api/v1/metadata` response, as seen by clients.
///
/// The server never builds this type; it streams the same shape fragment by
/// fragment. Clients that buffer the whole body decode into it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataResponse {
    pub status: String,
    #[serde(default)]
    pub data: BTreeMap<String, Vec<MetadataEntry>>,
}

impl MetadataResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Total number of entries across all metrics.
    pub fn entry_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}
