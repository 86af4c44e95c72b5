use crate::graph::DependencyGraph;
use serde::{Deserialize, Serialize};
use strata_core::StrataResult;
use uuid::Uuid;

/// How a plan's stages are executed. Derived from the stage shape, not
/// chosen arbitrarily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Every stage holds exactly one task.
    Sequential,
    /// A single stage of two or more independent tasks.
    Parallel,
    /// Multiple stages, at least one of them concurrent.
    Hybrid,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Sequential => write!(f, "sequential"),
            Strategy::Parallel => write!(f, "parallel"),
            Strategy::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Topologically staged execution plan for a task graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Derived execution strategy.
    pub strategy: Strategy,
    /// Ordered stages; tasks within a stage have no inter-dependencies
    /// and may run concurrently.
    pub stages: Vec<Vec<Uuid>>,
}

impl ExecutionPlan {
    /// Stages a validated graph and derives the strategy.
    pub fn from_graph(graph: &DependencyGraph) -> StrataResult<Self> {
        graph.validate()?;
        let stages = graph.stages()?;
        let strategy = derive_strategy(&stages);
        Ok(Self { strategy, stages })
    }

    /// Total number of tasks across all stages.
    pub fn task_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }
}

fn derive_strategy(stages: &[Vec<Uuid>]) -> Strategy {
    if stages.len() == 1 && stages[0].len() >= 2 {
        Strategy::Parallel
    } else if stages.iter().all(|s| s.len() == 1) {
        Strategy::Sequential
    } else {
        Strategy::Hybrid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    #[test]
    fn test_linear_chain_is_sequential() {
        let mut graph = DependencyGraph::new();
        let a = graph.add(Task::new("A", "cap"));
        let b = graph.add(Task::new("B", "cap").with_dependencies([a]));
        graph.add(Task::new("C", "cap").with_dependencies([b]));

        let plan = ExecutionPlan::from_graph(&graph).unwrap();
        assert_eq!(plan.strategy, Strategy::Sequential);
        assert_eq!(plan.stages.len(), 3);
    }

    #[test]
    fn test_independent_tasks_are_parallel() {
        let mut graph = DependencyGraph::new();
        for i in 0..4 {
            graph.add(Task::new(format!("T{i}"), "cap"));
        }

        let plan = ExecutionPlan::from_graph(&graph).unwrap();
        assert_eq!(plan.strategy, Strategy::Parallel);
        assert_eq!(plan.stages.len(), 1);
        assert_eq!(plan.stages[0].len(), 4);
    }

    #[test]
    fn test_diamond_is_hybrid() {
        let mut graph = DependencyGraph::new();
        let root = graph.add(Task::new("root", "cap"));
        let left = graph.add(Task::new("left", "cap").with_dependencies([root]));
        let right = graph.add(Task::new("right", "cap").with_dependencies([root]));
        graph.add(Task::new("join", "cap").with_dependencies([left, right]));

        let plan = ExecutionPlan::from_graph(&graph).unwrap();
        assert_eq!(plan.strategy, Strategy::Hybrid);
        assert_eq!(plan.task_count(), 4);
    }

    #[test]
    fn test_single_task_is_sequential() {
        let mut graph = DependencyGraph::new();
        graph.add(Task::new("only", "cap"));
        let plan = ExecutionPlan::from_graph(&graph).unwrap();
        assert_eq!(plan.strategy, Strategy::Sequential);
    }

    #[test]
    fn test_cyclic_graph_has_no_plan() {
        let mut graph = DependencyGraph::new();
        let mut t1 = Task::new("A", "cap");
        let mut t2 = Task::new("B", "cap");
        t1.depends_on.insert(t2.id);
        t2.depends_on.insert(t1.id);
        graph.add(t1);
        graph.add(t2);
        assert!(ExecutionPlan::from_graph(&graph).is_err());
    }
}
