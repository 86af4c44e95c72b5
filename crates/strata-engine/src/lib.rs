//! The adaptive task-orchestration engine.
//!
//! Implements the classify → tier → decompose → dispatch → validate
//! pipeline with graceful degradation: incoming requests are scored by
//! concurrent sub-assessors, mapped onto an execution tier, decomposed
//! into a staged task graph, dispatched across capability providers
//! with per-stage fan-out/fan-in, and validated through quality gates
//! with a bounded reflection loop. Provider failures and budget
//! exhaustion move the session down an explicit five-level degradation
//! ladder that only recovers through periodic checks.
//!
//! # Main types
//!
//! - [`Engine`] — Top-level entry point: submit, cancel, direct-execute.
//! - [`EngineOutcome`] / [`OrchestrationReport`] — Structured terminal results.
//! - [`DegradationController`] — The five-level fallback state machine.
//! - [`ValidationPipeline`] — Concurrent quality gates with required/advisory aggregation.
//! - [`RequestContext`] — Per-request snapshots threaded through every component.

/// Per-request context and cooperative cancellation.
pub mod context;
/// The five-level degradation state machine.
pub mod degradation;
/// Stage dispatch: fan-out/fan-in, retries, timeouts.
mod dispatch;
/// The engine entry point.
pub mod engine;
/// Engine-wide counters.
pub mod metrics;
/// Structured terminal results.
pub mod report;
/// Quality gates and the validation pipeline.
pub mod validation;

pub use context::{cancellation_pair, CancellationHandle, CancellationToken, RequestContext};
pub use degradation::{
    DegradationController, DegradationLevel, DegradationState, DegradationTrigger, Escalation,
};
pub use engine::Engine;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use report::{EngineOutcome, OrchestrationReport, Verdict};
pub use validation::{
    CoverageGate, GateReport, GateResult, SafetyGate, StructureGate, ValidationGate,
    ValidationInput, ValidationPipeline, ValidationReport,
};
