use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use strata_core::{StrataError, StrataResult};
use uuid::Uuid;

/// A directed acyclic graph of tasks.
///
/// Insertion order is preserved so staging is deterministic. The graph
/// is validated as a whole before any scheduling: unknown dependencies,
/// self-references, and cycles are all fatal decomposition errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    tasks: HashMap<Uuid, Task>,
    order: Vec<Uuid>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task, returning its ID.
    pub fn add(&mut self, task: Task) -> Uuid {
        let id = task.id;
        if self.tasks.insert(id, task).is_none() {
            self.order.push(id);
        }
        id
    }

    /// Gets a task by ID.
    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Gets a mutable task by ID.
    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// IDs of tasks nothing depends on (the graph's sinks).
    pub fn sinks(&self) -> Vec<Uuid> {
        let depended_on: HashSet<Uuid> = self
            .tasks
            .values()
            .flat_map(|t| t.depends_on.iter().copied())
            .collect();
        self.order
            .iter()
            .copied()
            .filter(|id| !depended_on.contains(id))
            .collect()
    }

    /// Validates the graph: every dependency must reference a known,
    /// different task, and the graph must be acyclic.
    pub fn validate(&self) -> StrataResult<()> {
        for task in self.tasks.values() {
            for dep in &task.depends_on {
                if *dep == task.id {
                    return Err(StrataError::Decomposition(format!(
                        "Task {} depends on itself",
                        task.id
                    )));
                }
                if !self.tasks.contains_key(dep) {
                    return Err(StrataError::Decomposition(format!(
                        "Task {} depends on unknown task {dep}",
                        task.id
                    )));
                }
            }
        }
        if self.has_cycle() {
            return Err(StrataError::Decomposition(
                "Dependency cycle detected in task graph".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks for cycles in the dependency graph.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashMap::new();
        for &id in self.tasks.keys() {
            if self.dfs_cycle(id, &mut visited) {
                return true;
            }
        }
        false
    }

    fn dfs_cycle(&self, id: Uuid, visited: &mut HashMap<Uuid, u8>) -> bool {
        match visited.get(&id) {
            Some(1) => return true,  // back edge = cycle
            Some(2) => return false, // already processed
            _ => {}
        }
        visited.insert(id, 1); // mark as in progress
        if let Some(task) = self.tasks.get(&id) {
            for dep in &task.depends_on {
                if self.dfs_cycle(*dep, visited) {
                    return true;
                }
            }
        }
        visited.insert(id, 2); // mark as done
        false
    }

    /// Groups the graph into topological stages via Kahn's algorithm:
    /// repeatedly extract the set of zero-indegree tasks as one stage,
    /// remove them, repeat. Tasks within a stage have no
    /// inter-dependencies. Errors if a cycle prevents completion.
    pub fn stages(&self) -> StrataResult<Vec<Vec<Uuid>>> {
        let mut indegree: HashMap<Uuid, usize> = self
            .tasks
            .values()
            .map(|t| (t.id, t.depends_on.len()))
            .collect();
        let mut remaining: HashSet<Uuid> = self.tasks.keys().copied().collect();
        let mut stages = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<Uuid> = self
                .order
                .iter()
                .copied()
                .filter(|id| remaining.contains(id) && indegree.get(id) == Some(&0))
                .collect();

            if ready.is_empty() {
                return Err(StrataError::Decomposition(
                    "Dependency cycle detected in task graph".to_string(),
                ));
            }

            for id in &ready {
                remaining.remove(id);
            }
            for task in self.tasks.values() {
                if !remaining.contains(&task.id) {
                    continue;
                }
                let satisfied = task
                    .depends_on
                    .iter()
                    .filter(|dep| ready.contains(dep))
                    .count();
                if satisfied > 0 {
                    if let Some(d) = indegree.get_mut(&task.id) {
                        *d -= satisfied;
                    }
                }
            }
            stages.push(ready);
        }

        Ok(stages)
    }
}
