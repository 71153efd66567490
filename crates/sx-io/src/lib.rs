//! # sx-io — The "Engine" of SEXTANT
//!
//! Turns an ordered row cursor into a streamed JSON document.
//! Row cursor in, [`regroup::Regrouper`] in the middle, bounded
//! fragment channel out. One producer task per request drives all three.

pub mod channel;
pub mod cursor;
pub mod pump;
pub mod regroup;
pub mod report;

pub use channel::{fragment_channel, ConsumerGone, FragmentSender, FragmentStream};
pub use cursor::{CursorError, RawRow, RowCursor, VecCursor};
pub use pump::{pump, PumpOutcome, PumpReport};
pub use regroup::{Phase, Regrouper, RowError};
pub use report::{ErrorReporter, TracingReporter};
