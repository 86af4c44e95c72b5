use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use strata_core::{ModelTier, StrataError, StrataResult, Tier};

/// One band of the score → tier mapping. A band covers
/// `(previous max, max_score]`; the first band starts at 0 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBand {
    /// Upper bound of the band, inclusive.
    pub max_score: u8,
    /// The tier this band maps to.
    pub tier: Tier,
}

/// Immutable per-tier policy record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierProfile {
    /// Minimum successful capability invocations a plan under this tier
    /// must record.
    pub min_capability_invocations: u32,
    /// Whether single dependency-free tasks may bypass the coordinator.
    /// Only the trivial tier is permitted to set this.
    pub allowed_direct_execution: bool,
    /// Default model hint forwarded to providers.
    pub default_model_tier: ModelTier,
}

/// Validated score-band table plus per-tier profiles and the critical
/// tag set.
///
/// Construction validates the schema: bands must be non-overlapping,
/// contiguous from 0 to 100, and monotone in tier order; every tier
/// needs a profile; direct execution outside the trivial tier is
/// rejected.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    bands: Vec<ScoreBand>,
    profiles: HashMap<Tier, TierProfile>,
    critical_tags: BTreeSet<String>,
}

impl PolicyTable {
    /// Builds and validates a policy table.
    pub fn new(
        bands: Vec<ScoreBand>,
        profiles: HashMap<Tier, TierProfile>,
        critical_tags: BTreeSet<String>,
    ) -> StrataResult<Self> {
        if bands.is_empty() {
            return Err(StrataError::Config("Policy has no score bands".to_string()));
        }
        let mut sorted = bands.clone();
        sorted.sort_by_key(|b| b.max_score);
        if sorted != bands {
            return Err(StrataError::Config(
                "Score bands must be listed in ascending max_score order".to_string(),
            ));
        }
        if bands.last().map(|b| b.max_score) != Some(100) {
            return Err(StrataError::Config(
                "Score bands must cover scores up to 100".to_string(),
            ));
        }
        for pair in bands.windows(2) {
            if pair[0].max_score == pair[1].max_score {
                return Err(StrataError::Config(format!(
                    "Overlapping score bands at max_score {}",
                    pair[0].max_score
                )));
            }
            if pair[0].tier > pair[1].tier {
                return Err(StrataError::Config(format!(
                    "Tier mapping is not monotonic: {} before {}",
                    pair[0].tier, pair[1].tier
                )));
            }
        }
        for tier in [
            Tier::Trivial,
            Tier::Fast,
            Tier::Standard,
            Tier::Advanced,
            Tier::Full,
        ] {
            let profile = profiles.get(&tier).ok_or_else(|| {
                StrataError::Config(format!("Missing profile for tier {tier}"))
            })?;
            if profile.allowed_direct_execution && tier != Tier::Trivial {
                return Err(StrataError::Config(format!(
                    "Direct execution is only permitted for the trivial tier, not {tier}"
                )));
            }
        }
        Ok(Self {
            bands,
            profiles,
            critical_tags,
        })
    }

    /// The default table from the shipped score bands and profiles.
    #[allow(clippy::expect_used)]
    pub fn with_defaults() -> Self {
        let bands = vec![
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
        ];
        let profiles = default_profiles();
        let critical_tags = ["critical", "deploy", "security", "incident"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        // The shipped table satisfies its own schema.
        Self::new(bands, profiles, critical_tags).expect("default policy table is valid")
    }

    /// Maps a score and tag set to a tier.
    ///
    /// Pure function: the same inputs always produce the same tier. Any
    /// critical tag floors the result at [`Tier::Standard`].
    pub fn tier_for(&self, score: u8, tags: &BTreeSet<String>) -> Tier {
        let score = score.min(100);
        let raw = self
            .bands
            .iter()
            .find(|b| score <= b.max_score)
            .map(|b| b.tier)
            .unwrap_or(Tier::Full);
        if tags.iter().any(|t| self.critical_tags.contains(t)) {
            raw.max(Tier::Standard)
        } else {
            raw
        }
    }

    /// The profile for a tier.
    #[allow(clippy::expect_used)]
    pub fn profile(&self, tier: Tier) -> &TierProfile {
        // Validated at construction: every tier has a profile.
        self.profiles.get(&tier).expect("profile present for tier")
    }

    /// The configured critical tags.
    pub fn critical_tags(&self) -> &BTreeSet<String> {
        &self.critical_tags
    }
}

/// The shipped per-tier profiles.
pub fn default_profiles() -> HashMap<Tier, TierProfile> {
    HashMap::from([
        (
            Tier::Trivial,
            TierProfile {
                min_capability_invocations: 0,
                allowed_direct_execution: true,
                default_model_tier: ModelTier::Light,
            },
        ),
        (
            Tier::Fast,
            TierProfile {
                min_capability_invocations: 1,
                allowed_direct_execution: false,
                default_model_tier: ModelTier::Light,
            },
        ),
        (
            Tier::Standard,
            TierProfile {
                min_capability_invocations: 2,
                allowed_direct_execution: false,
                default_model_tier: ModelTier::Balanced,
            },
        ),
        (
            Tier::Advanced,
            TierProfile {
                min_capability_invocations: 3,
                allowed_direct_execution: false,
                default_model_tier: ModelTier::Balanced,
            },
        ),
        (
            Tier::Full,
            TierProfile {
                min_capability_invocations: 4,
                allowed_direct_execution: false,
                default_model_tier: ModelTier::Heavy,
            },
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_band_boundaries() {
        let table = PolicyTable::with_defaults();
        let none = BTreeSet::new();
        assert_eq!(table.tier_for(0, &none), Tier::Trivial);
        assert_eq!(table.tier_for(30, &none), Tier::Trivial);
        assert_eq!(table.tier_for(31, &none), Tier::Fast);
        assert_eq!(table.tier_for(50, &none), Tier::Fast);
        assert_eq!(table.tier_for(51, &none), Tier::Standard);
        assert_eq!(table.tier_for(70, &none), Tier::Standard);
        assert_eq!(table.tier_for(71, &none), Tier::Advanced);
        assert_eq!(table.tier_for(85, &none), Tier::Advanced);
        assert_eq!(table.tier_for(86, &none), Tier::Full);
        assert_eq!(table.tier_for(100, &none), Tier::Full);
    }

    #[test]
    fn test_tiering_is_monotonic_over_full_range() {
        let table = PolicyTable::with_defaults();
        let none = BTreeSet::new();
        let mut previous = table.tier_for(0, &none);
        for score in 1..=100u8 {
            let tier = table.tier_for(score, &none);
            assert!(
                previous <= tier,
                "tier({}) = {} < tier({}) = {}",
                score,
                tier,
                score - 1,
                previous
            );
            previous = tier;
        }
    }

    #[test]
    fn test_critical_tag_floors_at_standard() {
        let table = PolicyTable::with_defaults();
        assert_eq!(table.tier_for(25, &tags(&["critical"])), Tier::Standard);
        assert_eq!(table.tier_for(55, &tags(&["deploy"])), Tier::Standard);
        // Floor, not ceiling: higher tiers are untouched.
        assert_eq!(table.tier_for(90, &tags(&["critical"])), Tier::Full);
        // Non-critical tags do nothing.
        assert_eq!(table.tier_for(25, &tags(&["docs"])), Tier::Trivial);
    }

    #[test]
    fn test_rejects_overlapping_bands() {
        let mut bands = PolicyTable::with_defaults().bands;
        bands[1].max_score = 30;
        let err = PolicyTable::new(bands, default_profiles(), BTreeSet::new()).unwrap_err();
        assert!(matches!(err, StrataError::Config(_)));
    }

    #[test]
    fn test_rejects_gap_below_100() {
        let bands = vec![
            ScoreBand {
                max_score: 30,
                tier: Tier::Trivial,
            },
            ScoreBand {
                max_score: 90,
                tier: Tier::Fast,
            },
        ];
        assert!(PolicyTable::new(bands, default_profiles(), BTreeSet::new()).is_err());
    }

    #[test]
    fn test_rejects_non_monotonic_tiers() {
        let bands = vec![
            ScoreBand {
                max_score: 50,
                tier: Tier::Standard,
            },
            ScoreBand {
                max_score: 100,
                tier: Tier::Fast,
            },
        ];
        assert!(PolicyTable::new(bands, default_profiles(), BTreeSet::new()).is_err());
    }

    #[test]
    fn test_rejects_direct_execution_outside_trivial() {
        let table = PolicyTable::with_defaults();
        let mut profiles = default_profiles();
        if let Some(p) = profiles.get_mut(&Tier::Standard) {
            p.allowed_direct_execution = true;
        }
        let err =
            PolicyTable::new(table.bands.clone(), profiles, BTreeSet::new()).unwrap_err();
        assert!(matches!(err, StrataError::Config(_)));
    }

    #[test]
    fn test_only_trivial_allows_direct_execution() {
        let table = PolicyTable::with_defaults();
        assert!(table.profile(Tier::Trivial).allowed_direct_execution);
        for tier in [Tier::Fast, Tier::Standard, Tier::Advanced, Tier::Full] {
            assert!(!table.profile(tier).allowed_direct_execution);
        }
    }
}
