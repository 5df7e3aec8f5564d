//! Cancellation scopes.
//!
//! A cancellation scope is a generation marker identifying one login
//! session's work. The session allocates a fresh scope on every login and
//! fires the old one on logout; every suspension point in the dispatch
//! path races its wait against [`CancellationScope::cancelled`].

use tokio::sync::watch;

/// Owning half of a cancellation scope.
///
/// Held by the session for the duration of one login session. Dropping the
/// controller without calling [`ScopeController::cancel`] leaves the scope
/// permanently un-cancelled.
pub struct ScopeController {
    generation: u64,
    tx: watch::Sender<bool>,
}

impl ScopeController {
    /// Create a controller for a new scope generation.
    #[must_use]
    pub(crate) fn new(generation: u64) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { generation, tx }
    }

    /// Hand out a scope bound to this controller.
    #[must_use]
    pub fn scope(&self) -> CancellationScope {
        CancellationScope {
            generation: self.generation,
            rx: self.tx.subscribe(),
        }
    }

    /// Fire the cancellation signal.
    ///
    /// Best-effort: a signal with no live listeners is not an error.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
        tracing::debug!(generation = self.generation, "Cancellation scope fired");
    }

    /// Generation this controller owns.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Listening half of a cancellation scope.
///
/// Cloned into every request bound to the session that allocated it.
#[derive(Clone)]
pub struct CancellationScope {
    generation: u64,
    rx: watch::Receiver<bool>,
}

impl CancellationScope {
    /// A scope that can never be cancelled.
    ///
    /// Used as the queue's scope reference while no session is active.
    #[must_use]
    pub fn detached() -> Self {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        Self { generation: 0, rx }
    }

    /// Whether the scope has already been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the scope is cancelled.
    ///
    /// Never resolves for a detached scope or a scope whose controller was
    /// dropped without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without firing: this scope can no longer be
                // cancelled.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Generation this scope belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let controller = ScopeController::new(1);
        let scope = controller.scope();

        let waiter = tokio::spawn(async move { scope.cancelled().await });

        controller.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_observed_after_the_fact() {
        let controller = ScopeController::new(2);
        let scope = controller.scope();

        assert!(!scope.is_cancelled());
        controller.cancel();
        assert!(scope.is_cancelled());

        // A wait started after cancellation resolves immediately.
        tokio::time::timeout(Duration::from_millis(100), scope.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_detached_scope_never_fires() {
        let scope = CancellationScope::detached();
        assert!(!scope.is_cancelled());
        assert_eq!(scope.generation(), 0);

        let result =
            tokio::time::timeout(Duration::from_millis(50), scope.cancelled()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dropped_controller_without_cancel_never_fires() {
        let controller = ScopeController::new(3);
        let scope = controller.scope();
        drop(controller);

        let result =
            tokio::time::timeout(Duration::from_millis(50), scope.cancelled()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_scope_carries_generation() {
        let controller = ScopeController::new(7);
        assert_eq!(controller.generation(), 7);
        assert_eq!(controller.scope().generation(), 7);
    }
}
