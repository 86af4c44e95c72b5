use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A budget threshold crossing, reported once per threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetThreshold {
    /// The percentage boundary that was crossed (e.g. 80).
    pub percent: u8,
}

/// Token budget for a single request, shared across concurrent task
/// dispatches via atomic accounting.
///
/// Thresholds are evaluated after each `charge`; each configured
/// threshold fires at most once for the budget's lifetime so repeated
/// polling does not re-trigger degradation.
#[derive(Debug)]
pub struct TokenBudget {
    limit: u64,
    used: AtomicU64,
    thresholds: Vec<u8>,
    fired: AtomicU64, // bitmask over `thresholds` indices
}

impl TokenBudget {
    /// Creates a budget with the given limit and threshold percentages.
    ///
    /// Thresholds are sorted ascending; duplicates are kept harmless by
    /// the fire-once bitmask.
    pub fn new(limit: u64, mut thresholds: Vec<u8>) -> Self {
        thresholds.sort_unstable();
        Self {
            limit,
            used: AtomicU64::new(0),
            thresholds,
            fired: AtomicU64::new(0),
        }
    }

    /// Total limit in tokens.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Tokens consumed so far.
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    /// Consumption as a percentage of the limit, saturating at 100.
    pub fn percent_used(&self) -> u8 {
        if self.limit == 0 {
            return 100;
        }
        ((self.used().saturating_mul(100) / self.limit).min(100)) as u8
    }

    /// Records consumption and returns any thresholds newly crossed,
    /// lowest first.
    pub fn charge(&self, tokens: u64) -> Vec<BudgetThreshold> {
        self.used.fetch_add(tokens, Ordering::Relaxed);
        let percent = self.percent_used();

        let mut crossed = Vec::new();
        for (idx, boundary) in self.thresholds.iter().enumerate() {
            if percent < *boundary {
                break;
            }
            let bit = 1u64 << idx;
            // fetch_or returns the previous mask: only the first crosser
            // of each boundary reports it.
            if self.fired.fetch_or(bit, Ordering::Relaxed) & bit == 0 {
                crossed.push(BudgetThreshold { percent: *boundary });
            }
        }
        crossed
    }

    /// Whether the budget is fully exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.used() >= self.limit
    }
}
