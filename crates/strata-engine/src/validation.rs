use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::{StrataError, StrataResult};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateResult {
    /// The check held.
    Pass,
    /// The check failed.
    Fail,
}

/// A named check's report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    /// Gate name.
    pub name: String,
    /// Whether a failure blocks the plan.
    pub required: bool,
    /// Pass or fail.
    pub result: GateResult,
    /// Human-readable detail, fed back into reflection cycles.
    pub detail: String,
}

/// What the gates inspect: the request payload and every task output.
#[derive(Debug, Clone)]
pub struct ValidationInput {
    /// The original request payload.
    pub payload: String,
    /// Output per task, as produced by the final dispatch.
    pub outputs: HashMap<Uuid, String>,
    /// How many tasks the plan contained.
    pub task_count: usize,
}

/// A quality gate run after the final stage.
#[async_trait]
pub trait ValidationGate: Send + Sync {
    /// Gate name, stable across runs.
    fn name(&self) -> &str;

    /// Whether a failure here blocks the plan. Non-required gates are
    /// advisory: logged, never blocking.
    fn required(&self) -> bool;

    /// Runs the check.
    async fn check(&self, input: &ValidationInput) -> StrataResult<GateReport>;
}

/// Aggregated result of one validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Every gate's report.
    pub gates: Vec<GateReport>,
    /// `true` iff every required gate passed.
    pub passed: bool,
}

impl ValidationReport {
    /// Details of the required gates that failed.
    pub fn failure_detail(&self) -> String {
        self.gates
            .iter()
            .filter(|g| g.required && g.result == GateResult::Fail)
            .map(|g| format!("{}: {}", g.name, g.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Names of the required gates that failed.
    pub fn failed_gates(&self) -> Vec<String> {
        self.gates
            .iter()
            .filter(|g| g.required && g.result == GateResult::Fail)
            .map(|g| g.name.clone())
            .collect()
    }
}

/// Runs a configured set of gates concurrently and aggregates their
/// reports: overall pass iff all required gates pass.
pub struct ValidationPipeline {
    gates: Vec<Arc<dyn ValidationGate>>,
}

impl ValidationPipeline {
    /// A pipeline with the built-in gates: structure and safety
    /// (required) plus coverage (advisory).
    pub fn with_defaults() -> StrataResult<Self> {
        Ok(Self {
            gates: vec![
                Arc::new(StructureGate),
                Arc::new(SafetyGate::new(None)?),
                Arc::new(CoverageGate),
            ],
        })
    }

    /// A pipeline with custom gates.
    pub fn new(gates: Vec<Arc<dyn ValidationGate>>) -> Self {
        Self { gates }
    }

    /// Runs every gate concurrently and joins their reports.
    pub async fn run(&self, input: &ValidationInput) -> StrataResult<ValidationReport> {
        let input = Arc::new(input.clone());
        let mut join_set: JoinSet<StrataResult<GateReport>> = JoinSet::new();
        for gate in &self.gates {
            let gate = gate.clone();
            let input = input.clone();
            join_set.spawn(async move { gate.check(&input).await });
        }

        let mut reports = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let report = joined
                .map_err(|e| StrataError::Validation(format!("Gate task panicked: {e}")))??;
            if report.result == GateResult::Fail {
                if report.required {
                    warn!(gate = %report.name, detail = %report.detail, "Required gate failed");
                } else {
                    debug!(gate = %report.name, detail = %report.detail, "Advisory gate flagged");
                }
            }
            reports.push(report);
        }
        // Join order is completion order; keep reports stable by name.
        reports.sort_by(|a, b| a.name.cmp(&b.name));

        let passed = reports
            .iter()
            .filter(|r| r.required)
            .all(|r| r.result == GateResult::Pass);
        Ok(ValidationReport {
            gates: reports,
            passed,
        })
    }
}

/// Required gate: every succeeded task must have produced non-empty
/// output.
pub struct StructureGate;

#[async_trait]
impl ValidationGate for StructureGate {
    fn name(&self) -> &str {
        "structure"
    }

    fn required(&self) -> bool {
        true
    }

    async fn check(&self, input: &ValidationInput) -> StrataResult<GateReport> {
        let empty: Vec<String> = input
            .outputs
            .iter()
            .filter(|(_, output)| output.trim().is_empty())
            .map(|(id, _)| id.to_string())
            .collect();
        let (result, detail) = if empty.is_empty() {
            (GateResult::Pass, "all outputs well-formed".to_string())
        } else {
            (
                GateResult::Fail,
                format!("empty output from tasks: {}", empty.join(", ")),
            )
        };
        Ok(GateReport {
            name: self.name().to_string(),
            required: true,
            result,
            detail,
        })
    }
}

/// Required gate: outputs must not contain denylisted markers.
pub struct SafetyGate {
    denylist: Regex,
}

impl SafetyGate {
    /// Builds the gate; `pattern` overrides the built-in denylist.
    pub fn new(pattern: Option<&str>) -> StrataResult<Self> {
        let pattern = pattern.unwrap_or(r"(?i)rm\s+-rf\s+/|drop\s+table|--force\s+push");
        let denylist = Regex::new(pattern)
            .map_err(|e| StrataError::Validation(format!("Invalid safety pattern: {e}")))?;
        Ok(Self { denylist })
    }
}

#[async_trait]
impl ValidationGate for SafetyGate {
    fn name(&self) -> &str {
        "safety"
    }

    fn required(&self) -> bool {
        true
    }

    async fn check(&self, input: &ValidationInput) -> StrataResult<GateReport> {
        let flagged: Vec<String> = input
            .outputs
            .iter()
            .filter(|(_, output)| self.denylist.is_match(output))
            .map(|(id, _)| id.to_string())
            .collect();
        let (result, detail) = if flagged.is_empty() {
            (GateResult::Pass, "no unsafe content".to_string())
        } else {
            (
                GateResult::Fail,
                format!("unsafe content in tasks: {}", flagged.join(", ")),
            )
        };
        Ok(GateReport {
            name: self.name().to_string(),
            required: true,
            result,
            detail,
        })
    }
}

/// Advisory gate: flags plans where some tasks produced no output at
/// all (e.g. the plan stopped early). Logged, never blocking.
pub struct CoverageGate;

#[async_trait]
impl ValidationGate for CoverageGate {
    fn name(&self) -> &str {
        "coverage"
    }

    fn required(&self) -> bool {
        false
    }

    async fn check(&self, input: &ValidationInput) -> StrataResult<GateReport> {
        let missing = input.task_count.saturating_sub(input.outputs.len());
        let (result, detail) = if missing == 0 {
            (GateResult::Pass, "every task produced output".to_string())
        } else {
            (
                GateResult::Fail,
                format!("{missing} of {} tasks produced no output", input.task_count),
            )
        };
        Ok(GateReport {
            name: self.name().to_string(),
            required: false,
            result,
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(outputs: &[(&str, &str)]) -> ValidationInput {
        let outputs: HashMap<Uuid, String> = outputs
            .iter()
            .map(|(_, v)| (Uuid::new_v4(), (*v).to_string()))
            .collect();
        ValidationInput {
            payload: "test request".to_string(),
            task_count: outputs.len(),
            outputs,
        }
    }

    #[tokio::test]
    async fn test_all_gates_pass_on_clean_output() {
        let pipeline = ValidationPipeline::with_defaults().unwrap();
        let report = pipeline
            .run(&input(&[("a", "result one"), ("b", "result two")]))
            .await
            .unwrap();
        assert!(report.passed);
        assert_eq!(report.gates.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_output_fails_structure() {
        let pipeline = ValidationPipeline::with_defaults().unwrap();
        let report = pipeline
            .run(&input(&[("a", "fine"), ("b", "   ")]))
            .await
            .unwrap();
        assert!(!report.passed);
        assert_eq!(report.failed_gates(), vec!["structure".to_string()]);
        assert!(report.failure_detail().contains("empty output"));
    }

    #[tokio::test]
    async fn test_unsafe_output_fails_safety() {
        let pipeline = ValidationPipeline::with_defaults().unwrap();
        let report = pipeline
            .run(&input(&[("a", "run rm -rf / to clean up")]))
            .await
            .unwrap();
        assert!(!report.passed);
        assert!(report.failed_gates().contains(&"safety".to_string()));
    }

    #[tokio::test]
    async fn test_advisory_gate_never_blocks() {
        let pipeline = ValidationPipeline::with_defaults().unwrap();
        let mut incomplete = input(&[("a", "only result")]);
        incomplete.task_count = 3;

        let report = pipeline.run(&incomplete).await.unwrap();
        // Coverage flags the missing outputs, but the overall verdict
        // only follows required gates.
        assert!(report.passed);
        let coverage = report
            .gates
            .iter()
            .find(|g| g.name == "coverage")
            .unwrap();
        assert_eq!(coverage.result, GateResult::Fail);
        assert!(!coverage.required);
    }
}
