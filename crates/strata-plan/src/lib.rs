//! Task decomposition and dependency-aware planning.
//!
//! The [`Decomposer`] turns a classified request into a
//! [`DependencyGraph`] of atomic tasks, each mapped at decomposition
//! time to exactly one registered capability. The graph is topologically
//! layered (Kahn's algorithm) into an [`ExecutionPlan`] of stages; the
//! strategy is derived from the stage shape, never chosen arbitrarily.
//!
//! Cyclic or self-referential dependency declarations are a fatal
//! decomposition error: the whole request is rejected rather than
//! partially scheduled.

/// The decomposer and capability resolution.
pub mod decomposer;
/// The dependency graph and cycle detection.
pub mod graph;
/// Execution plans and strategy derivation.
pub mod plan;
/// The atomic task type.
pub mod task;

pub use decomposer::{CapabilityStats, Decomposer, NoHistory};
pub use graph::DependencyGraph;
pub use plan::{ExecutionPlan, Strategy};
pub use task::Task;
