use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// An atomic unit of work, mapped to exactly one capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: Uuid,
    /// What the capability should do.
    pub description: String,
    /// The registered capability that executes this task.
    pub required_capability: String,
    /// Tasks that must complete before this one starts.
    pub depends_on: BTreeSet<Uuid>,
}

impl Task {
    /// Creates a dependency-free task.
    pub fn new(description: impl Into<String>, required_capability: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            required_capability: required_capability.into(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Adds dependencies, builder-style.
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = Uuid>) -> Self {
        self.depends_on.extend(deps);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder() {
        let dep = Uuid::new_v4();
        let task = Task::new("lint the module", "analysis").with_dependencies([dep]);
        assert_eq!(task.required_capability, "analysis");
        assert!(task.depends_on.contains(&dep));
    }
}
