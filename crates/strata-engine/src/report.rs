use crate::validation::GateReport;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strata_core::{ExecutionHistory, Tier};
use strata_plan::Strategy;
use uuid::Uuid;

/// Overall verdict of a completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every required gate passed and no task failed.
    Pass,
    /// A required gate or a task failed terminally, or the caller
    /// cancelled.
    Fail,
}

/// The structured terminal result of one request.
///
/// Nothing fails silently: a failed request carries the degradation
/// level reached and the gates or tasks responsible, alongside the full
/// execution record trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationReport {
    /// The request this report describes.
    pub request_id: Uuid,
    /// The tier it executed under.
    pub tier: Tier,
    /// The derived strategy.
    pub strategy: Strategy,
    /// The plan's topological stages, as dispatched.
    pub stages: Vec<Vec<Uuid>>,
    /// Overall verdict.
    pub verdict: Verdict,
    /// Set when classification confidence was medium: results stand but
    /// carry an uncertainty flag.
    pub uncertainty_flagged: bool,
    /// Whether the trivial-tier direct execution path was used.
    pub direct_execution: bool,
    /// Whether the caller cancelled mid-flight.
    pub cancelled: bool,
    /// Human-readable outcome summary.
    pub summary: String,
    /// Append-only record trail for audit.
    pub history: ExecutionHistory,
    /// Gate reports from the final validation pass, if one ran.
    pub gates: Vec<GateReport>,
    /// Required gates that failed, if any.
    pub failed_gates: Vec<String>,
    /// Tasks that failed terminally, with their last error.
    pub failed_tasks: Vec<(Uuid, String)>,
    /// Degradation level when the request finished (1..=5).
    pub degradation_level: u8,
    /// Notifications the trust policy requires the caller to see.
    pub notifications: Vec<String>,
    /// Output per succeeded task.
    pub outputs: HashMap<Uuid, String>,
    /// Successful capability invocations recorded.
    pub successful_invocations: u32,
    /// Reflection cycles consumed by validation failures.
    pub reflection_cycles: u32,
}

/// What the engine hands back for a submitted request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EngineOutcome {
    /// The request executed to a verdict.
    Completed(OrchestrationReport),
    /// Classification confidence was too low to act on; the caller
    /// should clarify and resubmit instead.
    NeedsClarification {
        /// The confidence that fell short.
        confidence: u8,
        /// What the caller is asked to do.
        message: String,
    },
}

impl EngineOutcome {
    /// The report, when the request completed.
    pub fn report(&self) -> Option<&OrchestrationReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::NeedsClarification { .. } => None,
        }
    }
}
