//! Tier policy and engine configuration.
//!
//! The tier policy is a deterministic lookup from a complexity score to
//! an execution [`Tier`](strata_core::Tier), with a critical-tag floor:
//! tier is a pure function of `(score, tags)` with no hidden state.
//! Each tier carries an immutable [`TierProfile`] defining its minimum
//! capability invocations, whether direct execution is permitted, and
//! its default model tier.
//!
//! Configuration is a versioned TOML document validated against its
//! schema before activation; the [`ConfigWatcher`] hot-reloads it on
//! file change, rejecting invalid documents so the previous config stays
//! active.

/// The TOML configuration document and its validation.
pub mod config;
/// Score bands, tier profiles, and the policy table.
pub mod tier;
/// Debounced file watcher for config hot reload.
pub mod watcher;

pub use config::{
    BudgetConfig, ClassifierSettings, ConfidenceConfig, CoordinatorConfig, DegradationConfig,
    PolicyConfig, StrataConfig, ValidationConfig,
};
pub use tier::{PolicyTable, ScoreBand, TierProfile};
pub use watcher::ConfigWatcher;
