//! Core types and error definitions for the Strata orchestration engine.
//!
//! This crate provides the foundational types shared across all Strata
//! crates: the unified error enum, the immutable [`Request`], the
//! classification result consumed by the tier policy, execution records,
//! and the token budget threaded through a request's context.
//!
//! # Main types
//!
//! - [`StrataError`] — Unified error enum for all Strata subsystems.
//! - [`StrataResult`] — Convenience alias for `Result<T, StrataError>`.
//! - [`Request`] — An incoming unit of work, immutable once created.
//! - [`ClassificationResult`] — Scores and tags produced by the classifier.
//! - [`Tier`] — Discrete execution-complexity class (`Trivial`…`Full`).
//! - [`ExecutionRecord`] — Per-task outcome, retained append-only for audit.
//! - [`TokenBudget`] — Atomic resource accounting with threshold detection.

/// Token budget accounting shared across a request's lifetime.
pub mod budget;
/// Classification scores, priority tags, and execution tiers.
pub mod classification;
/// Per-task execution records and their append-only history.
pub mod record;
/// The immutable incoming request.
pub mod request;

pub use budget::{BudgetThreshold, TokenBudget};
pub use classification::{ClassificationResult, ModelTier, Tier};
pub use record::{ExecutionHistory, ExecutionRecord, ExecutionStatus};
pub use request::Request;

/// Top-level error type for the Strata engine.
///
/// Each variant corresponds to one entry in the failure taxonomy. Fatal
/// categories (`Policy`, `Decomposition`) reject the request up-front;
/// recoverable categories are retried locally before they surface.
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    /// A sub-assessor exhausted its retries. Non-fatal: the classifier
    /// substitutes conservative defaults and the request proceeds under
    /// maximum scrutiny.
    #[error("Classification error: {0}")]
    Classification(String),

    /// Tier rules were bypassed (e.g. direct execution outside the
    /// trivial tier). Fatal, rejected immediately.
    #[error("Policy violation: {0}")]
    Policy(String),

    /// The decomposer produced or was handed an invalid task graph
    /// (cycles, unknown capabilities). Fatal, the request is rejected.
    #[error("Decomposition error: {0}")]
    Decomposition(String),

    /// A capability provider failed or timed out.
    #[error("Capability error: {0}")]
    Capability(String),

    /// A required validation gate failed beyond the reflection budget.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A resource budget threshold was crossed. Feeds the degradation
    /// ladder rather than failing the request outright.
    #[error("Resource exhaustion: {0}")]
    Resource(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the consolidation store or trust store.
    #[error("Store error: {0}")]
    Store(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`StrataError`].
pub type StrataResult<T> = Result<T, StrataError>;
