use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use strata_core::{StrataError, StrataResult, Tier};
use strata_plan::CapabilityStats;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

/// Summary of a completed request, appended once per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSummary {
    /// The completed request.
    pub request_id: Uuid,
    /// Its session.
    pub session_id: Uuid,
    /// The tier it executed under.
    pub tier: Tier,
    /// The derived strategy, as displayed.
    pub strategy: String,
    /// Tasks that succeeded.
    pub succeeded: u32,
    /// Tasks that failed terminally.
    pub failed: u32,
    /// Degradation level when the request completed.
    pub degradation_level: u8,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
}

/// Aggregate signal of a recurring request shape. Advisory only: three
/// or more occurrences produce a suggestion, never an automatic change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    /// Signature of the normalized payload shape.
    pub signature: String,
    /// How many times this shape has been seen.
    pub occurrence_count: u32,
    /// When it was last seen.
    pub last_seen: DateTime<Utc>,
    /// The automation suggestion, once emitted.
    pub suggested_automation: Option<String>,
}

/// A single append/increment-only update to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsolidationUpdate {
    /// A request finished; append its summary.
    RequestCompleted(RequestSummary),
    /// One capability invocation resolved.
    CapabilityOutcome {
        /// The capability that was invoked.
        capability_id: String,
        /// Whether the invocation succeeded.
        success: bool,
    },
    /// A request shape was observed.
    PatternObserved {
        /// Signature of the shape.
        signature: String,
        /// Observation time, carried so journal replay is faithful.
        observed_at: DateTime<Utc>,
    },
    /// A suggestion was recorded for a recurring pattern.
    SuggestionRecorded {
        /// Signature of the pattern.
        signature: String,
        /// The suggestion text.
        suggestion: String,
    },
}

impl ConsolidationUpdate {
    /// Convenience constructor stamping the observation time.
    pub fn pattern_observed(signature: impl Into<String>) -> Self {
        Self::PatternObserved {
            signature: signature.into(),
            observed_at: Utc::now(),
        }
    }
}

/// Computes the pattern signature of a payload: whitespace collapsed,
/// case folded, digit runs replaced, then hashed so structurally similar
/// requests collide.
pub fn pattern_signature(payload: &str) -> String {
    let mut normalized = String::with_capacity(payload.len());
    let mut last_space = true;
    let mut last_digit = false;
    for c in payload.trim().chars() {
        if c.is_whitespace() {
            if !last_space {
                normalized.push(' ');
            }
            last_space = true;
            last_digit = false;
        } else if c.is_ascii_digit() {
            if !last_digit {
                normalized.push('#');
            }
            last_space = false;
            last_digit = true;
        } else {
            normalized.extend(c.to_lowercase());
            last_space = false;
            last_digit = false;
        }
    }
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(&digest[..16])
}

#[derive(Default)]
struct StoreState {
    summary_count: u64,
    capability_stats: HashMap<String, (u64, u64)>, // (successes, failures)
    patterns: HashMap<String, PatternRecord>,
}

impl StoreState {
    fn apply(&mut self, update: &ConsolidationUpdate) {
        match update {
            ConsolidationUpdate::RequestCompleted(_) => self.summary_count += 1,
            ConsolidationUpdate::CapabilityOutcome {
                capability_id,
                success,
            } => {
                let entry = self
                    .capability_stats
                    .entry(capability_id.clone())
                    .or_default();
                if *success {
                    entry.0 += 1;
                } else {
                    entry.1 += 1;
                }
            }
            ConsolidationUpdate::PatternObserved {
                signature,
                observed_at,
            } => {
                let record =
                    self.patterns
                        .entry(signature.clone())
                        .or_insert_with(|| PatternRecord {
                            signature: signature.clone(),
                            occurrence_count: 0,
                            last_seen: *observed_at,
                            suggested_automation: None,
                        });
                record.occurrence_count += 1;
                record.last_seen = *observed_at;
            }
            ConsolidationUpdate::SuggestionRecorded {
                signature,
                suggestion,
            } => {
                if let Some(record) = self.patterns.get_mut(signature) {
                    record.suggested_automation = Some(suggestion.clone());
                }
            }
        }
    }
}

enum Msg {
    Update(ConsolidationUpdate),
    Sync(oneshot::Sender<()>),
}

/// Append/increment-only knowledge store.
///
/// All writes flow through a single-writer queue: callers enqueue
/// updates and the owning task applies them to the in-memory state and
/// the on-disk journal, so concurrent requests never lose increments.
/// Reads take a snapshot that may trail the queue — pattern records are
/// advisory, so eventual consistency is acceptable.
pub struct ConsolidationStore {
    tx: mpsc::UnboundedSender<Msg>,
    state: Arc<RwLock<StoreState>>,
}

impl ConsolidationStore {
    /// Opens the store in `dir`, replaying any existing journal.
    pub async fn open(dir: PathBuf) -> StrataResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        let journal_path = dir.join("consolidation.jsonl");

        let mut state = StoreState::default();
        if journal_path.exists() {
            let raw = tokio::fs::read_to_string(&journal_path).await?;
            for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<ConsolidationUpdate>(line) {
                    Ok(update) => state.apply(&update),
                    Err(e) => warn!(error = %e, "Skipping corrupt journal line"),
                }
            }
        }

        let state = Arc::new(RwLock::new(state));
        let (tx, mut rx) = mpsc::unbounded_channel::<Msg>();

        let mut journal = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .await?;

        let writer_state = state.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    Msg::Update(update) => {
                        if let Ok(mut guard) = writer_state.write() {
                            guard.apply(&update);
                        }
                        match serde_json::to_string(&update) {
                            Ok(line) => {
                                let line = format!("{line}\n");
                                if let Err(e) = journal.write_all(line.as_bytes()).await {
                                    warn!(error = %e, "Failed to append journal line");
                                }
                                let _ = journal.flush().await;
                            }
                            Err(e) => warn!(error = %e, "Failed to serialize update"),
                        }
                    }
                    Msg::Sync(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Ok(Self { tx, state })
    }

    /// Enqueues an update. Never blocks; ordering follows enqueue order.
    pub fn record(&self, update: ConsolidationUpdate) {
        let _ = self.tx.send(Msg::Update(update));
    }

    /// Waits until every previously enqueued update has been applied.
    pub async fn sync(&self) -> StrataResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Msg::Sync(ack_tx))
            .map_err(|_| StrataError::Store("Store writer has shut down".to_string()))?;
        ack_rx
            .await
            .map_err(|_| StrataError::Store("Store writer has shut down".to_string()))
    }

    /// Current pattern record for a signature, if any.
    pub fn pattern(&self, signature: &str) -> Option<PatternRecord> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.patterns.get(signature).cloned())
    }

    /// Snapshot of all pattern records.
    pub fn patterns(&self) -> Vec<PatternRecord> {
        self.state
            .read()
            .map(|s| s.patterns.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of request summaries appended so far.
    pub fn summary_count(&self) -> u64 {
        self.state.read().map(|s| s.summary_count).unwrap_or(0)
    }

    /// Scans for recurring patterns (three or more occurrences) without
    /// a recorded suggestion, records a suggestion for each, and returns
    /// them. Suggestion only — the store never changes engine behavior
    /// by itself.
    pub fn scan_for_suggestions(&self) -> Vec<PatternRecord> {
        let eligible: Vec<PatternRecord> = self
            .state
            .read()
            .map(|s| {
                s.patterns
                    .values()
                    .filter(|p| p.occurrence_count >= 3 && p.suggested_automation.is_none())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut suggested = Vec::new();
        for mut record in eligible {
            let suggestion = format!(
                "Recurring request shape seen {} times; consider a dedicated automation",
                record.occurrence_count
            );
            info!(
                signature = %record.signature,
                occurrences = record.occurrence_count,
                "Automation suggestion"
            );
            self.record(ConsolidationUpdate::SuggestionRecorded {
                signature: record.signature.clone(),
                suggestion: suggestion.clone(),
            });
            record.suggested_automation = Some(suggestion);
            suggested.push(record);
        }
        suggested
    }

    /// Spawns the periodic background scan.
    pub fn spawn_suggestion_scan(
        self: &Arc<Self>,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                store.scan_for_suggestions();
            }
        })
    }
}

impl CapabilityStats for ConsolidationStore {
    fn success_rate(&self, capability_id: &str) -> Option<f64> {
        let guard = self.state.read().ok()?;
        let (successes, failures) = guard.capability_stats.get(capability_id)?;
        let total = successes + failures;
        if total == 0 {
            None
        } else {
            Some(*successes as f64 / total as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RequestSummary {
        RequestSummary {
            request_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            tier: Tier::Standard,
            strategy: "hybrid".to_string(),
            succeeded: 3,
            failed: 0,
            degradation_level: 1,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_writes_are_applied_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidationStore::open(dir.path().to_path_buf())
            .await
            .unwrap();

        store.record(ConsolidationUpdate::RequestCompleted(summary()));
        store.record(ConsolidationUpdate::CapabilityOutcome {
            capability_id: "codegen".to_string(),
            success: true,
        });
        store.record(ConsolidationUpdate::CapabilityOutcome {
            capability_id: "codegen".to_string(),
            success: false,
        });
        store.sync().await.unwrap();

        assert_eq!(store.summary_count(), 1);
        assert_eq!(store.success_rate("codegen"), Some(0.5));
        assert_eq!(store.success_rate("unknown"), None);
    }

    #[tokio::test]
    async fn test_pattern_counter_increments() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidationStore::open(dir.path().to_path_buf())
            .await
            .unwrap();

        let sig = pattern_signature("deploy service 42");
        for _ in 0..2 {
            store.record(ConsolidationUpdate::pattern_observed(sig.clone()));
        }
        store.sync().await.unwrap();

        let record = store.pattern(&sig).unwrap();
        assert_eq!(record.occurrence_count, 2);
        assert!(record.suggested_automation.is_none());
    }

    #[tokio::test]
    async fn test_third_occurrence_triggers_suggestion_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidationStore::open(dir.path().to_path_buf())
            .await
            .unwrap();

        let sig = pattern_signature("rotate the staging keys");
        for _ in 0..3 {
            store.record(ConsolidationUpdate::pattern_observed(sig.clone()));
        }
        store.sync().await.unwrap();

        let suggested = store.scan_for_suggestions();
        assert_eq!(suggested.len(), 1);
        assert_eq!(suggested[0].occurrence_count, 3);
        assert!(suggested[0].suggested_automation.is_some());

        // A second scan emits nothing new.
        store.sync().await.unwrap();
        assert!(store.scan_for_suggestions().is_empty());
    }

    #[tokio::test]
    async fn test_journal_replay_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();

        {
            let store = ConsolidationStore::open(path.clone()).await.unwrap();
            store.record(ConsolidationUpdate::CapabilityOutcome {
                capability_id: "analysis".to_string(),
                success: true,
            });
            store.record(ConsolidationUpdate::pattern_observed(pattern_signature(
                "audit the ledger",
            )));
            store.sync().await.unwrap();
        }

        let reopened = ConsolidationStore::open(path).await.unwrap();
        assert_eq!(reopened.success_rate("analysis"), Some(1.0));
        assert_eq!(
            reopened
                .pattern(&pattern_signature("audit the ledger"))
                .unwrap()
                .occurrence_count,
            1
        );
    }

    #[test]
    fn test_signature_is_structural() {
        // Case, whitespace, and numeric differences collapse.
        assert_eq!(
            pattern_signature("Deploy  service 42"),
            pattern_signature("deploy service 7")
        );
        // Different shapes stay distinct.
        assert_ne!(
            pattern_signature("deploy service"),
            pattern_signature("audit service")
        );
    }
}
