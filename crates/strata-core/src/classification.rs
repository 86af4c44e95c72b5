use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Scores and tags produced by the classifier for a single request.
///
/// Produced once per request by concurrent sub-assessors and consumed
/// read-only by every downstream component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Estimated complexity in `[0, 100]`.
    pub complexity_score: u8,
    /// Priority signals detected in the payload (e.g. `"deploy"`).
    pub priority_tags: BTreeSet<String>,
    /// Estimated input quality in `[0, 100]`.
    pub quality_score: u8,
    /// Classifier confidence in `[0, 100]`. Low confidence gates
    /// execution entirely.
    pub confidence: u8,
}

impl ClassificationResult {
    /// The conservative fallback used when a sub-assessor exhausts its
    /// retries: maximum complexity, zero confidence, so the request
    /// receives maximum scrutiny downstream.
    pub fn conservative_default() -> Self {
        Self {
            complexity_score: 100,
            priority_tags: BTreeSet::new(),
            quality_score: 0,
            confidence: 0,
        }
    }

    /// Whether any of the given critical tags is present.
    pub fn has_any_tag<'a>(&self, tags: impl IntoIterator<Item = &'a str>) -> bool {
        tags.into_iter().any(|t| self.priority_tags.contains(t))
    }
}

/// Discrete execution-complexity class governing the minimum rigor a
/// request receives. Ordered: `Trivial < Fast < Standard < Advanced < Full`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Single dependency-free task; the only tier permitting direct
    /// execution without the coordinator.
    Trivial,
    /// Shallow decomposition, at most three tasks.
    Fast,
    /// Full decomposition and staged scheduling.
    Standard,
    /// Standard plus stricter validation defaults.
    Advanced,
    /// Maximum rigor; every gate required.
    Full,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Trivial => write!(f, "trivial"),
            Tier::Fast => write!(f, "fast"),
            Tier::Standard => write!(f, "standard"),
            Tier::Advanced => write!(f, "advanced"),
            Tier::Full => write!(f, "full"),
        }
    }
}

/// Model weight hint forwarded to capability providers.
///
/// The engine never interprets this beyond passing it along; providers
/// map it onto whatever backends they use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Smallest/cheapest backend.
    Light,
    /// Default backend.
    Balanced,
    /// Largest/most capable backend.
    Heavy,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTier::Light => write!(f, "light"),
            ModelTier::Balanced => write!(f, "balanced"),
            ModelTier::Heavy => write!(f, "heavy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Trivial < Tier::Fast);
        assert!(Tier::Fast < Tier::Standard);
        assert!(Tier::Standard < Tier::Advanced);
        assert!(Tier::Advanced < Tier::Full);
    }

    #[test]
    fn test_conservative_default_forces_scrutiny() {
        let result = ClassificationResult::conservative_default();
        assert_eq!(result.complexity_score, 100);
        assert_eq!(result.confidence, 0);
    }

    #[test]
    fn test_has_any_tag() {
        let mut result = ClassificationResult::conservative_default();
        result.priority_tags.insert("deploy".to_string());
        assert!(result.has_any_tag(["critical", "deploy"]));
        assert!(!result.has_any_tag(["security"]));
    }

    #[test]
    fn test_tier_serialization() {
        let json = serde_json::to_string(&Tier::Advanced).unwrap();
        assert_eq!(json, "\"advanced\"");
        let parsed: Tier = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Tier::Advanced);
    }
}
