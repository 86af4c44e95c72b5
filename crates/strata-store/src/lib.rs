//! Persistence for decisions, patterns, and trust.
//!
//! Three stores, all file-backed:
//!
//! - [`ConsolidationStore`] — append/increment-only knowledge store fed
//!   after each completed request through a single-writer queue;
//!   read back for decomposer tie-breaks and pattern suggestions.
//! - [`DecisionLog`] — append-only JSONL log of tier and degradation
//!   decisions, one JSON object per line, used for audit and offline
//!   calibration.
//! - [`TrustManager`] — per-session trust records, read at request
//!   start and updated only through the explicit adjustment interface.

/// The consolidation store and pattern records.
pub mod consolidation;
/// The append-only decision log.
pub mod decision_log;
/// Per-session trust persistence.
pub mod trust;

pub use consolidation::{
    pattern_signature, ConsolidationStore, ConsolidationUpdate, PatternRecord, RequestSummary,
};
pub use decision_log::{DecisionEntry, DecisionLog};
pub use trust::{TrustLevel, TrustManager, TrustRecord};
