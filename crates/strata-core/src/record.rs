use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task's execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Not yet dispatched.
    Pending,
    /// Currently dispatched to a capability provider.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Failed terminally (retry budget exhausted).
    Failed,
    /// Failed at least once and re-dispatched.
    Retried,
    /// Cancelled by the caller before completion. Distinct from
    /// [`ExecutionStatus::Failed`] for audit purposes.
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is terminal (no further dispatch possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Per-task outcome, written only by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// The task this record describes.
    pub task_id: Uuid,
    /// Current status.
    pub status: ExecutionStatus,
    /// Number of dispatch attempts so far.
    pub attempts: u32,
    /// The most recent error, if any attempt failed.
    pub last_error: Option<String>,
    /// When the first attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// Creates a pending record for a task.
    pub fn pending(task_id: Uuid) -> Self {
        Self {
            task_id,
            status: ExecutionStatus::Pending,
            attempts: 0,
            last_error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Append-only trail of every record revision, retained for audit.
///
/// The coordinator pushes a snapshot on every status change; the latest
/// revision per task is the task's current state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionHistory {
    revisions: Vec<ExecutionRecord>,
}

impl ExecutionHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record revision.
    pub fn push(&mut self, record: ExecutionRecord) {
        self.revisions.push(record);
    }

    /// All revisions, in append order.
    pub fn revisions(&self) -> &[ExecutionRecord] {
        &self.revisions
    }

    /// The latest revision for a given task, if any.
    pub fn latest(&self, task_id: Uuid) -> Option<&ExecutionRecord> {
        self.revisions.iter().rev().find(|r| r.task_id == task_id)
    }

    /// Latest revisions for every task seen, in first-seen order.
    pub fn latest_per_task(&self) -> Vec<&ExecutionRecord> {
        let mut seen = Vec::new();
        let mut out: Vec<&ExecutionRecord> = Vec::new();
        for record in &self.revisions {
            if let Some(pos) = seen.iter().position(|id| *id == record.task_id) {
                out[pos] = record;
            } else {
                seen.push(record.task_id);
                out.push(record);
            }
        }
        out
    }

    /// Count of tasks whose latest revision has the given status.
    pub fn count_with_status(&self, status: &ExecutionStatus) -> usize {
        self.latest_per_task()
            .iter()
            .filter(|r| &r.status == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_record() {
        let id = Uuid::new_v4();
        let record = ExecutionRecord::pending(id);
        assert_eq!(record.status, ExecutionStatus::Pending);
        assert_eq!(record.attempts, 0);
        assert!(!record.status.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ExecutionStatus::Succeeded.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Retried.is_terminal());
    }

    #[test]
    fn test_history_is_append_only() {
        let id = Uuid::new_v4();
        let mut history = ExecutionHistory::new();

        let mut record = ExecutionRecord::pending(id);
        history.push(record.clone());

        record.status = ExecutionStatus::Running;
        record.attempts = 1;
        history.push(record.clone());

        record.status = ExecutionStatus::Succeeded;
        history.push(record);

        assert_eq!(history.revisions().len(), 3);
        assert_eq!(
            history.latest(id).map(|r| r.status.clone()),
            Some(ExecutionStatus::Succeeded)
        );
    }

    #[test]
    fn test_latest_per_task() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut history = ExecutionHistory::new();
        history.push(ExecutionRecord::pending(a));
        history.push(ExecutionRecord::pending(b));

        let mut done = ExecutionRecord::pending(a);
        done.status = ExecutionStatus::Succeeded;
        history.push(done);

        let latest = history.latest_per_task();
        assert_eq!(latest.len(), 2);
        assert_eq!(history.count_with_status(&ExecutionStatus::Succeeded), 1);
        assert_eq!(history.count_with_status(&ExecutionStatus::Pending), 1);
    }
}
