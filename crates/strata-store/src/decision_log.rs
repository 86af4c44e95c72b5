use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_core::{StrataError, StrataResult};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

/// One tier or degradation decision, as written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEntry {
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// The request the decision applies to.
    pub request_id: Uuid,
    /// The tier or level transitioned from (e.g. `"l1"`, `"standard"`).
    pub from_level: String,
    /// The tier or level transitioned to.
    pub to_level: String,
    /// What caused the transition (e.g. `"capability_failure"`).
    pub trigger: String,
    /// How the engine intends to proceed.
    pub resolution_plan: String,
}

impl DecisionEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(
        request_id: Uuid,
        from_level: impl Into<String>,
        to_level: impl Into<String>,
        trigger: impl Into<String>,
        resolution_plan: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id,
            from_level: from_level.into(),
            to_level: to_level.into(),
            trigger: trigger.into(),
            resolution_plan: resolution_plan.into(),
        }
    }
}

enum Msg {
    Entry(DecisionEntry),
    Sync(oneshot::Sender<()>),
}

/// Append-only decision log: one JSON object per line.
///
/// Entries are queued to a background writer so logging never blocks a
/// dispatch path; every line round-trips through serde for audit and
/// offline calibration.
pub struct DecisionLog {
    tx: mpsc::UnboundedSender<Msg>,
    path: PathBuf,
}

impl DecisionLog {
    /// Opens (or creates) `decisions.jsonl` under `dir` and spawns the
    /// writer task.
    pub async fn open(dir: PathBuf) -> StrataResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("decisions.jsonl");

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Msg>();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    Msg::Entry(entry) => match serde_json::to_string(&entry) {
                        Ok(line) => {
                            let line = format!("{line}\n");
                            if let Err(e) = file.write_all(line.as_bytes()).await {
                                warn!(error = %e, "Failed to append decision entry");
                            }
                            let _ = file.flush().await;
                        }
                        Err(e) => warn!(error = %e, "Failed to serialize decision entry"),
                    },
                    Msg::Sync(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Ok(Self { tx, path })
    }

    /// Appends an entry. Never blocks.
    pub fn log(&self, entry: DecisionEntry) {
        info!(
            request_id = %entry.request_id,
            from = %entry.from_level,
            to = %entry.to_level,
            trigger = %entry.trigger,
            "decision"
        );
        let _ = self.tx.send(Msg::Entry(entry));
    }

    /// Waits until every previously queued entry reached the file.
    pub async fn sync(&self) -> StrataResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Msg::Sync(ack_tx))
            .map_err(|_| StrataError::Store("Decision log writer has shut down".to_string()))?;
        ack_rx
            .await
            .map_err(|_| StrataError::Store("Decision log writer has shut down".to_string()))
    }

    /// Path of the underlying JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses every line of a decision log back into entries.
    pub fn read_all(path: &Path) -> StrataResult<Vec<DecisionEntry>> {
        let raw = std::fs::read_to_string(path)?;
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StrataError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_round_trip_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = DecisionLog::open(dir.path().to_path_buf()).await.unwrap();

        let first = DecisionEntry::new(
            Uuid::new_v4(),
            "l1",
            "l2",
            "capability_failure",
            "retry remaining tasks under single-fallback mode",
        );
        let second = DecisionEntry::new(
            Uuid::new_v4(),
            "standard",
            "standard",
            "tier_selected",
            "staged dispatch",
        );
        log.log(first.clone());
        log.log(second.clone());
        log.sync().await.unwrap();

        let entries = DecisionLog::read_all(log.path()).unwrap();
        assert_eq!(entries, vec![first, second]);
    }

    #[tokio::test]
    async fn test_reopen_appends_rather_than_truncates() {
        let dir = tempfile::tempdir().unwrap();

        let entry = DecisionEntry::new(Uuid::new_v4(), "l1", "l2", "timeout", "fallback");
        {
            let log = DecisionLog::open(dir.path().to_path_buf()).await.unwrap();
            log.log(entry.clone());
            log.sync().await.unwrap();
        }
        let log = DecisionLog::open(dir.path().to_path_buf()).await.unwrap();
        log.log(entry);
        log.sync().await.unwrap();

        assert_eq!(DecisionLog::read_all(log.path()).unwrap().len(), 2);
    }
}
