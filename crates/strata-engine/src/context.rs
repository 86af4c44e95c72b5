use crate::degradation::DegradationState;
use std::sync::Arc;
use strata_core::{ClassificationResult, Request, Tier, TokenBudget};
use strata_policy::TierProfile;
use strata_store::TrustLevel;
use tokio::sync::watch;

/// A caller-held handle that cancels an in-flight request.
///
/// Cancellation is cooperative: in-flight stage tasks observe it at
/// their next await point and are recorded as cancelled, a terminal
/// status distinct from failure.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

impl CancellationHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Creates a cancellation handle and the token the engine observes.
pub fn cancellation_pair() -> (CancellationHandle, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (CancellationHandle { tx }, CancellationToken { rx })
}

/// The engine-side cancellation observer.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// A token that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Sender gone: cancellation can never arrive.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Everything a component needs to process one request, threaded
/// explicitly through every call instead of living in ambient globals.
///
/// Mutable fields have single designated owners: only the degradation
/// controller writes degradation state, only the trust manager writes
/// trust, and the budget is shared atomically. Everything else here is
/// an immutable snapshot taken when processing started, so concurrent
/// requests in one session never race.
pub struct RequestContext {
    /// The request being processed.
    pub request: Request,
    /// Classification snapshot.
    pub classification: ClassificationResult,
    /// Selected tier.
    pub tier: Tier,
    /// The tier's policy record.
    pub profile: TierProfile,
    /// Trust snapshot taken at request start.
    pub trust: TrustLevel,
    /// Degradation snapshot taken at request start.
    pub degradation_at_start: DegradationState,
    /// Shared token budget for this request.
    pub budget: Arc<TokenBudget>,
    /// Cooperative cancellation token.
    pub cancel: CancellationToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let (handle, mut token) = cancellation_pair();
        assert!(!token.is_cancelled());
        handle.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_token_stays_live() {
        let token = CancellationToken::never();
        assert!(!token.is_cancelled());
    }
}
