//! Request classification.
//!
//! Four independent sub-assessors run concurrently over the same
//! [`Request`](strata_core::Request): priority/keyword detection,
//! complexity scoring, quality scoring, and confidence scoring. Each is
//! a pure function of the request with no shared mutable state; the
//! [`Classifier`] fans them out, joins on the slowest, and merges their
//! partial results into a single
//! [`ClassificationResult`](strata_core::ClassificationResult).
//!
//! A failing sub-assessor is retried with exponential backoff; after
//! exhaustion its contribution is replaced by a conservative value
//! (complexity 100, confidence 0) so the request receives maximum
//! scrutiny downstream instead of silently proceeding.

/// The sub-assessor trait and the four built-in assessors.
pub mod assessor;
/// The fan-out/fan-in classifier.
pub mod classifier;

pub use assessor::{
    Assessment, ComplexityAssessor, ConfidenceAssessor, PriorityAssessor, QualityAssessor,
    SubAssessor,
};
pub use classifier::{Classifier, ClassifierConfig};
