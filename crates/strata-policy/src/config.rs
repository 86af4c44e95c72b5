use crate::tier::{default_profiles, PolicyTable, ScoreBand, TierProfile};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use strata_core::{StrataError, StrataResult, Tier};

/// The versioned engine configuration document.
///
/// Loaded from TOML and validated as a whole before activation; a
/// document that fails validation is rejected and the previously active
/// configuration stays in force. All numeric thresholds in the engine
/// live here — representative defaults, not hard-coded truths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Schema version of this document.
    pub version: u32,
    /// Classifier retry settings and priority vocabulary.
    pub classifier: ClassifierSettings,
    /// Score bands, tier profiles, critical tags.
    pub policy: PolicyConfig,
    /// Dispatch retry, timeout, and parallelism settings.
    pub coordinator: CoordinatorConfig,
    /// Validation pipeline settings.
    pub validation: ValidationConfig,
    /// Confidence gating thresholds.
    pub confidence: ConfidenceConfig,
    /// Degradation ladder triggers and recovery cadence.
    pub degradation: DegradationConfig,
    /// Per-request token budget.
    pub budget: BudgetConfig,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            version: 1,
            classifier: ClassifierSettings::default(),
            policy: PolicyConfig::default(),
            coordinator: CoordinatorConfig::default(),
            validation: ValidationConfig::default(),
            confidence: ConfidenceConfig::default(),
            degradation: DegradationConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

/// Classifier section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Retries per sub-assessor after the initial attempt.
    pub max_retries: u32,
    /// Base backoff in milliseconds, doubled per retry.
    pub backoff_base_ms: u64,
    /// Words the priority assessor detects as tags.
    pub priority_vocabulary: Vec<String>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 200,
            priority_vocabulary: [
                "critical", "urgent", "deploy", "security", "incident", "production", "outage",
                "rollback", "hotfix",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        }
    }
}

/// Policy section: the raw band/profile data behind a [`PolicyTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Score bands in ascending `max_score` order.
    pub bands: Vec<ScoreBand>,
    /// Per-tier profiles keyed by tier name.
    pub profiles: HashMap<Tier, TierProfile>,
    /// Tags that floor the tier at standard.
    pub critical_tags: BTreeSet<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let table = PolicyTable::with_defaults();
        Self {
            bands: vec![
                ScoreBand {
                    max_score: 30,
                    tier: Tier::Trivial,
                },
                ScoreBand {
                    max_score: 50,
                    tier: Tier::Fast,
                },
                ScoreBand {
                    max_score: 70,
                    tier: Tier::Standard,
                },
                ScoreBand {
                    max_score: 85,
                    tier: Tier::Advanced,
                },
                ScoreBand {
                    max_score: 100,
                    tier: Tier::Full,
                },
            ],
            profiles: default_profiles(),
            critical_tags: table.critical_tags().clone(),
        }
    }
}

/// Coordinator section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Dispatch attempts per task, including the first.
    pub max_attempts: u32,
    /// Per-invocation timeout in seconds.
    pub invocation_timeout_secs: u64,
    /// Upper bound on concurrently dispatched tasks within a stage.
    pub max_parallel_tasks: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            invocation_timeout_secs: 30,
            max_parallel_tasks: 8,
        }
    }
}

/// Validation pipeline section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Reflection cycles before a gate failure becomes terminal.
    pub max_reflection_cycles: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_reflection_cycles: 3,
        }
    }
}

/// Confidence gating section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Below this, the engine asks for clarification instead of
    /// executing.
    pub clarify_below: u8,
    /// Below this (and at or above `clarify_below`), execution proceeds
    /// with an uncertainty flag.
    pub flag_below: u8,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            clarify_below: 70,
            flag_below: 85,
        }
    }
}

/// Degradation ladder section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Budget-percentage crossings that trigger one escalation each.
    pub budget_thresholds: Vec<u8>,
    /// Seconds between explicit recovery checks.
    pub recovery_interval_secs: u64,
    /// Consecutive capability failures that trigger an escalation.
    pub repeated_failure_trigger: u32,
    /// Deepest level automatic degradation may reach silently under the
    /// most trusted sessions. Clamped to 2: full silent bypass is
    /// disallowed.
    pub silent_floor_level: u8,
    /// Sessions at or below this trust level are notified on every
    /// transition.
    pub notify_at_or_below_trust: u8,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            budget_thresholds: vec![80, 90, 95],
            recovery_interval_secs: 60,
            repeated_failure_trigger: 2,
            silent_floor_level: 2,
            notify_at_or_below_trust: 2,
        }
    }
}

/// Token budget section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Per-request token limit.
    pub token_limit: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            token_limit: 100_000,
        }
    }
}

impl StrataConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(input: &str) -> StrataResult<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|e| StrataError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML document from disk.
    pub fn load(path: &Path) -> StrataResult<Self> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    /// Validates the whole document against its schema.
    ///
    /// Returns the first violation found. A document that fails here
    /// must never be activated.
    pub fn validate(&self) -> StrataResult<()> {
        // Building the table validates bands, profiles, and the
        // direct-execution rule.
        self.policy_table()?;

        if self.coordinator.max_attempts == 0 {
            return Err(StrataError::Config(
                "coordinator.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.coordinator.max_parallel_tasks == 0 {
            return Err(StrataError::Config(
                "coordinator.max_parallel_tasks must be at least 1".to_string(),
            ));
        }
        if self.validation.max_reflection_cycles == 0 {
            return Err(StrataError::Config(
                "validation.max_reflection_cycles must be at least 1".to_string(),
            ));
        }
        if self.confidence.clarify_below > self.confidence.flag_below {
            return Err(StrataError::Config(
                "confidence.clarify_below must not exceed confidence.flag_below".to_string(),
            ));
        }
        let thresholds = &self.degradation.budget_thresholds;
        if !thresholds.windows(2).all(|w| w[0] < w[1]) {
            return Err(StrataError::Config(
                "degradation.budget_thresholds must be strictly ascending".to_string(),
            ));
        }
        if thresholds.iter().any(|t| *t > 100) {
            return Err(StrataError::Config(
                "degradation.budget_thresholds must not exceed 100".to_string(),
            ));
        }
        if self.degradation.recovery_interval_secs == 0 {
            return Err(StrataError::Config(
                "degradation.recovery_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.degradation.repeated_failure_trigger == 0 {
            return Err(StrataError::Config(
                "degradation.repeated_failure_trigger must be at least 1".to_string(),
            ));
        }
        if self.degradation.silent_floor_level == 0 {
            return Err(StrataError::Config(
                "degradation.silent_floor_level must be a level 1 or 2".to_string(),
            ));
        }
        if self.degradation.silent_floor_level > 2 {
            return Err(StrataError::Config(
                "degradation.silent_floor_level past 2 would allow silent bypass below l2"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the validated policy table for this document.
    pub fn policy_table(&self) -> StrataResult<PolicyTable> {
        PolicyTable::new(
            self.policy.bands.clone(),
            self.policy.profiles.clone(),
            self.policy.critical_tags.clone(),
        )
    }
}
