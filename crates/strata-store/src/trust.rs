use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strata_core::{StrataError, StrataResult};
use tracing::info;
use uuid::Uuid;

/// Per-session trust level, `1..=5`.
///
/// Caps how deep automatic degradation may go without notifying the
/// caller: low trust forces a notification at every step, high trust
/// allows silent degradation down to a configured floor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrustLevel(u8);

impl TrustLevel {
    /// The level new sessions start at.
    pub const DEFAULT: TrustLevel = TrustLevel(3);

    /// Creates a level, clamped into `1..=5`.
    pub fn new(level: u8) -> Self {
        Self(level.clamp(1, 5))
    }

    /// The raw level.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for TrustLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The persisted per-session trust record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustRecord {
    /// Current trust level.
    pub trust_level: TrustLevel,
    /// When the level was last changed.
    pub last_updated: DateTime<Utc>,
}

impl Default for TrustRecord {
    fn default() -> Self {
        Self {
            trust_level: TrustLevel::DEFAULT,
            last_updated: Utc::now(),
        }
    }
}

/// The single writer of trust state.
///
/// Trust is read at request start as an immutable snapshot and changed
/// only through [`TrustManager::adjust`] — never inferred silently
/// mid-request. Records are one JSON file per session, surviving
/// restarts.
pub struct TrustManager {
    dir: PathBuf,
}

impl TrustManager {
    /// Opens the manager over a storage directory.
    pub async fn open(dir: PathBuf) -> StrataResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn record_path(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// The trust record for a session; new sessions get the default.
    pub async fn get(&self, session_id: Uuid) -> StrataResult<TrustRecord> {
        let path = self.record_path(session_id);
        if !path.exists() {
            return Ok(TrustRecord::default());
        }
        let raw = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&raw)
            .map_err(|e| StrataError::Store(format!("Failed to parse trust record: {e}")))
    }

    /// Explicitly sets a session's trust level and persists it.
    pub async fn adjust(&self, session_id: Uuid, level: TrustLevel) -> StrataResult<TrustRecord> {
        let record = TrustRecord {
            trust_level: level,
            last_updated: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(self.record_path(session_id), json).await?;
        info!(session_id = %session_id, level = %level, "Trust level adjusted");
        Ok(record)
    }
}
