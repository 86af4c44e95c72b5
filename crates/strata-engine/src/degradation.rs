use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use strata_policy::DegradationConfig;
use strata_store::{DecisionEntry, DecisionLog, TrustLevel};
use tracing::{info, warn};
use uuid::Uuid;

/// Point on the five-step fallback ladder, from full orchestration to
/// minimal direct response. Strictly ordered: `L1 < L2 < ... < L5`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DegradationLevel {
    /// Optimal: full orchestration.
    L1,
    /// Single fallback provider substitution.
    L2,
    /// Single-capability mode.
    L3,
    /// Rule-based responses only.
    L4,
    /// Direct minimal response; terminal for the current request.
    L5,
}

impl DegradationLevel {
    /// The next-worse level, or `None` at the bottom of the ladder.
    pub fn next_worse(self) -> Option<Self> {
        match self {
            Self::L1 => Some(Self::L2),
            Self::L2 => Some(Self::L3),
            Self::L3 => Some(Self::L4),
            Self::L4 => Some(Self::L5),
            Self::L5 => None,
        }
    }

    /// The next-better level, or `None` at the top.
    pub fn next_better(self) -> Option<Self> {
        match self {
            Self::L1 => None,
            Self::L2 => Some(Self::L1),
            Self::L3 => Some(Self::L2),
            Self::L4 => Some(Self::L3),
            Self::L5 => Some(Self::L4),
        }
    }

    /// Numeric level, `1..=5`.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::L1 => 1,
            Self::L2 => 2,
            Self::L3 => 3,
            Self::L4 => 4,
            Self::L5 => 5,
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "l{}", self.as_u8())
    }
}

/// What caused a degradation transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationTrigger {
    /// A capability invocation timed out terminally.
    CapabilityTimeout,
    /// A capability failed repeatedly and terminally.
    CapabilityFailure,
    /// The token budget crossed a configured percentage.
    BudgetThreshold(u8),
}

impl std::fmt::Display for DegradationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapabilityTimeout => write!(f, "capability_timeout"),
            Self::CapabilityFailure => write!(f, "capability_failure"),
            Self::BudgetThreshold(p) => write!(f, "budget_threshold_{p}"),
        }
    }
}

/// Current degradation state: one active value per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationState {
    /// Current level.
    pub level: DegradationLevel,
    /// What last worsened the level, if anything has.
    pub trigger: Option<String>,
    /// When the current level was entered.
    pub since: DateTime<Utc>,
    /// Whether a recovery check may improve the level.
    pub recovery_eligible: bool,
}

impl Default for DegradationState {
    fn default() -> Self {
        Self {
            level: DegradationLevel::L1,
            trigger: None,
            since: Utc::now(),
            recovery_eligible: false,
        }
    }
}

/// Result of an escalation, including whether the caller must be told.
#[derive(Debug, Clone)]
pub struct Escalation {
    /// Level before the transition.
    pub from: DegradationLevel,
    /// Level after the transition.
    pub to: DegradationLevel,
    /// Whether trust policy requires notifying the caller.
    pub notify: bool,
    /// Whether the ladder bottomed out: the caller should retry later.
    pub terminal: bool,
}

/// The sole writer of [`DegradationState`] for a session.
///
/// Levels worsen monotonically on triggers and improve only through
/// [`DegradationController::recovery_check`] — never opportunistically
/// mid-task. All other components read immutable snapshots taken at
/// request start.
pub struct DegradationController {
    state: RwLock<DegradationState>,
    config: DegradationConfig,
    failures_since_escalation: AtomicU32,
}

impl DegradationController {
    /// Creates a controller at `L1`.
    pub fn new(config: DegradationConfig) -> Self {
        Self {
            state: RwLock::new(DegradationState::default()),
            config,
            failures_since_escalation: AtomicU32::new(0),
        }
    }

    /// Immutable snapshot of the current state.
    pub fn snapshot(&self) -> DegradationState {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Current level.
    pub fn level(&self) -> DegradationLevel {
        self.snapshot().level
    }

    /// Worsens the ladder by one step and logs the decision.
    ///
    /// At `L5` no further automatic degradation happens; the escalation
    /// is reported as terminal so the caller can be told to retry later.
    /// Notification follows trust policy: low-trust sessions hear about
    /// every step, high-trust sessions may degrade silently down to the
    /// configured floor (never past `L2`).
    pub fn escalate(
        &self,
        trigger: DegradationTrigger,
        trust: TrustLevel,
        request_id: Uuid,
        log: &DecisionLog,
    ) -> Escalation {
        self.failures_since_escalation.store(0, Ordering::Relaxed);

        let (from, to) = {
            let mut state = match self.state.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let from = state.level;
            let to = from.next_worse().unwrap_or(from);
            state.level = to;
            state.trigger = Some(trigger.to_string());
            state.since = Utc::now();
            state.recovery_eligible = to > DegradationLevel::L1;
            (from, to)
        };

        let terminal = to == DegradationLevel::L5;
        let notify = self.must_notify(trust, to);

        let resolution = if terminal {
            "ladder exhausted; ask caller to retry later".to_string()
        } else {
            format!("continue under {to} fallback mode")
        };
        log.log(DecisionEntry::new(
            request_id,
            from.to_string(),
            to.to_string(),
            trigger.to_string(),
            resolution,
        ));

        if from == to {
            warn!(request_id = %request_id, trigger = %trigger, "Already at l5, no further degradation");
        } else {
            info!(
                request_id = %request_id,
                from = %from,
                to = %to,
                trigger = %trigger,
                notify,
                "Degradation escalated"
            );
        }

        Escalation {
            from,
            to,
            notify,
            terminal,
        }
    }

    fn must_notify(&self, trust: TrustLevel, to: DegradationLevel) -> bool {
        if trust.get() <= self.config.notify_at_or_below_trust {
            return true;
        }
        // High trust: silent only down to the floor; anything past it is
        // always surfaced. The floor is validated to never pass l2.
        to.as_u8() > self.config.silent_floor_level
    }

    /// Reports a terminally failed task.
    ///
    /// Escalates when the capability failed repeatedly in sequence (at
    /// least the configured trigger count) or its final attempt timed
    /// out; an isolated failure below the trigger only marks the
    /// recovery window dirty.
    pub fn task_failed(
        &self,
        failed_attempts: u32,
        timed_out: bool,
        trust: TrustLevel,
        request_id: Uuid,
        log: &DecisionLog,
    ) -> Option<Escalation> {
        if !timed_out && failed_attempts < self.config.repeated_failure_trigger {
            self.note_failure();
            return None;
        }
        let trigger = if timed_out {
            DegradationTrigger::CapabilityTimeout
        } else {
            DegradationTrigger::CapabilityFailure
        };
        let escalation = self.escalate(trigger, trust, request_id, log);
        self.note_failure();
        Some(escalation)
    }

    /// Records one terminal task failure for recovery bookkeeping.
    pub fn note_failure(&self) {
        self.failures_since_escalation.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether the condition behind the last escalation has cleared.
    /// Default probe: no terminal failures since the last transition.
    pub fn condition_cleared(&self) -> bool {
        self.failures_since_escalation.load(Ordering::Relaxed) == 0
    }

    /// Explicit recovery check. Improves the level by one step iff the
    /// degradation condition has cleared, and logs the decision. This is
    /// the only path by which the level ever improves.
    pub fn recovery_check(&self, request_id: Uuid, log: &DecisionLog) -> Option<DegradationLevel> {
        if !self.condition_cleared() {
            // Consumed: the next interval starts a fresh observation.
            self.failures_since_escalation.store(0, Ordering::Relaxed);
            return None;
        }
        let (from, to) = {
            let mut state = match self.state.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let from = state.level;
            let to = from.next_better()?;
            state.level = to;
            state.trigger = None;
            state.since = Utc::now();
            state.recovery_eligible = to > DegradationLevel::L1;
            (from, to)
        };

        log.log(DecisionEntry::new(
            request_id,
            from.to_string(),
            to.to_string(),
            "recovery",
            format!("condition cleared, restored to {to}"),
        ));
        info!(from = %from, to = %to, "Degradation recovered one step");
        Some(to)
    }

    /// Spawns the periodic recovery loop at the configured interval.
    pub fn spawn_recovery_loop(
        self: &Arc<Self>,
        log: Arc<DecisionLog>,
    ) -> tokio::task::JoinHandle<()> {
        let controller = Arc::clone(self);
        let interval = std::time::Duration::from_secs(controller.config.recovery_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so recovery is
            // genuinely periodic.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                controller.recovery_check(Uuid::nil(), &log);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn log() -> (tempfile::TempDir, DecisionLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = DecisionLog::open(dir.path().to_path_buf()).await.unwrap();
        (dir, log)
    }

    fn controller() -> DegradationController {
        DegradationController::new(DegradationConfig::default())
    }

    #[test]
    fn test_ladder_ordering() {
        assert!(DegradationLevel::L1 < DegradationLevel::L5);
        assert_eq!(DegradationLevel::L4.next_worse(), Some(DegradationLevel::L5));
        assert_eq!(DegradationLevel::L5.next_worse(), None);
        assert_eq!(DegradationLevel::L1.next_better(), None);
    }

    #[tokio::test]
    async fn test_escalation_worsens_monotonically() {
        let (_dir, log) = log().await;
        let c = controller();
        let trust = TrustLevel::DEFAULT;
        let id = Uuid::new_v4();

        let mut previous = c.level();
        for _ in 0..6 {
            c.escalate(DegradationTrigger::CapabilityFailure, trust, id, &log);
            let current = c.level();
            assert!(current >= previous, "level improved without recovery");
            previous = current;
        }
        assert_eq!(c.level(), DegradationLevel::L5);
    }

    #[tokio::test]
    async fn test_l5_is_terminal() {
        let (_dir, log) = log().await;
        let c = controller();
        let id = Uuid::new_v4();
        for _ in 0..4 {
            c.escalate(DegradationTrigger::CapabilityFailure, TrustLevel::DEFAULT, id, &log);
        }
        let esc = c.escalate(DegradationTrigger::CapabilityFailure, TrustLevel::DEFAULT, id, &log);
        assert!(esc.terminal);
        assert_eq!(esc.from, DegradationLevel::L5);
        assert_eq!(esc.to, DegradationLevel::L5);
    }

    #[tokio::test]
    async fn test_recovery_requires_cleared_condition() {
        let (_dir, log) = log().await;
        let c = controller();
        let id = Uuid::new_v4();
        c.escalate(DegradationTrigger::CapabilityTimeout, TrustLevel::DEFAULT, id, &log);
        assert_eq!(c.level(), DegradationLevel::L2);

        // Condition not cleared: a failure was observed since.
        c.note_failure();
        assert!(c.recovery_check(id, &log).is_none());
        assert_eq!(c.level(), DegradationLevel::L2);

        // Next interval with a clean window recovers one step.
        assert_eq!(c.recovery_check(id, &log), Some(DegradationLevel::L1));
        assert_eq!(c.level(), DegradationLevel::L1);

        // At l1 there is nothing to recover.
        assert!(c.recovery_check(id, &log).is_none());
    }

    #[tokio::test]
    async fn test_isolated_failure_below_trigger_does_not_escalate() {
        let (_dir, log) = log().await;
        let c = controller();
        let id = Uuid::new_v4();

        // One failed attempt, no timeout: below the default trigger of 2.
        let esc = c.task_failed(1, false, TrustLevel::DEFAULT, id, &log);
        assert!(esc.is_none());
        assert_eq!(c.level(), DegradationLevel::L1);

        // Repeated failure meets the trigger.
        let esc = c.task_failed(3, false, TrustLevel::DEFAULT, id, &log);
        assert!(esc.is_some());
        assert_eq!(c.level(), DegradationLevel::L2);

        // A terminal timeout escalates regardless of the count.
        let esc = c.task_failed(1, true, TrustLevel::DEFAULT, id, &log);
        assert!(esc.is_some());
        assert_eq!(c.level(), DegradationLevel::L3);
    }

    #[tokio::test]
    async fn test_low_trust_always_notifies() {
        let (_dir, log) = log().await;
        let c = controller();
        let esc = c.escalate(
            DegradationTrigger::CapabilityFailure,
            TrustLevel::new(1),
            Uuid::new_v4(),
            &log,
        );
        assert!(esc.notify);
    }

    #[tokio::test]
    async fn test_high_trust_silent_only_to_floor() {
        let (_dir, log) = log().await;
        let c = controller();
        let trust = TrustLevel::new(5);
        let id = Uuid::new_v4();

        // l1 -> l2: within the floor, silent.
        let esc = c.escalate(DegradationTrigger::CapabilityFailure, trust, id, &log);
        assert_eq!(esc.to, DegradationLevel::L2);
        assert!(!esc.notify);

        // l2 -> l3: past the floor, must notify even at max trust.
        let esc = c.escalate(DegradationTrigger::CapabilityFailure, trust, id, &log);
        assert_eq!(esc.to, DegradationLevel::L3);
        assert!(esc.notify);
    }

    #[tokio::test]
    async fn test_escalation_is_logged() {
        let (_dir, log) = log().await;
        let c = controller();
        let id = Uuid::new_v4();
        c.escalate(DegradationTrigger::CapabilityFailure, TrustLevel::DEFAULT, id, &log);
        log.sync().await.unwrap();

        let entries = DecisionLog::read_all(log.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].from_level, "l1");
        assert_eq!(entries[0].to_level, "l2");
        assert_eq!(entries[0].trigger, "capability_failure");
        assert_eq!(entries[0].request_id, id);
    }
}
