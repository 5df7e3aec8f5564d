//! Session state machine.
//!
//! Exactly one [`Session`] exists per client instance. All login/logout
//! transitions run under one serializing lock; the login state is also
//! published through a watch channel so the request gate can read an
//! atomic snapshot without touching the lock.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, MutexGuard, watch};

use crate::auth::{LoginState, TokenKind};
use crate::model::CurrentUser;
use crate::scope::{CancellationScope, ScopeController};

struct SessionInner {
    token_kind: Option<TokenKind>,
    token: Option<String>,
    identity: Option<CurrentUser>,
    controller: Option<ScopeController>,
}

/// The authentication session of one client instance.
pub struct Session {
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<LoginState>,
    generations: AtomicU64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a logged-out session.
    #[must_use]
    pub fn new() -> Self {
        let (state_tx, _rx) = watch::channel(LoginState::LoggedOut);
        Self {
            inner: Mutex::new(SessionInner {
                token_kind: None,
                token: None,
                identity: None,
                controller: None,
            }),
            state_tx,
            generations: AtomicU64::new(0),
        }
    }

    /// Current login state, read without acquiring the session lock.
    #[must_use]
    pub fn login_state(&self) -> LoginState {
        *self.state_tx.borrow()
    }

    /// A receiver over the login state, used by the request gate.
    pub(crate) fn gate(&self) -> watch::Receiver<LoginState> {
        self.state_tx.subscribe()
    }

    /// Identity of the logged-in account, if any.
    ///
    /// Waits for any in-flight transition to finish.
    pub async fn identity(&self) -> Option<CurrentUser> {
        self.inner.lock().await.identity.clone()
    }

    /// Begin a transition, acquiring the serializing lock.
    ///
    /// At most one login or logout procedure holds this at a time; every
    /// other caller blocks here until it is free.
    pub(crate) async fn transition(&self) -> SessionTransition<'_> {
        SessionTransition {
            inner: self.inner.lock().await,
            state_tx: &self.state_tx,
            generations: &self.generations,
        }
    }
}

/// Exclusive access to the session for one login/logout procedure.
pub(crate) struct SessionTransition<'a> {
    inner: MutexGuard<'a, SessionInner>,
    state_tx: &'a watch::Sender<LoginState>,
    generations: &'a AtomicU64,
}

impl SessionTransition<'_> {
    pub(crate) fn state(&self) -> LoginState {
        *self.state_tx.borrow()
    }

    pub(crate) fn set_state(&mut self, state: LoginState) {
        tracing::info!(?state, "Session state changed");
        self.state_tx.send_replace(state);
    }

    /// Allocate a new cancellation scope, superseding the old one.
    ///
    /// Whatever requests were still bound to the previous scope are
    /// cancelled by the supersession itself.
    pub(crate) fn install_scope(&mut self) -> CancellationScope {
        if let Some(old) = self.inner.controller.take() {
            old.cancel();
        }
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let controller = ScopeController::new(generation);
        let scope = controller.scope();
        self.inner.controller = Some(controller);
        tracing::debug!(generation, "Allocated cancellation scope");
        scope
    }

    /// Fire the current scope's cancellation signal, best-effort.
    pub(crate) fn cancel_scope(&self) {
        if let Some(controller) = &self.inner.controller {
            controller.cancel();
        }
    }

    /// Drop the scope reference entirely.
    pub(crate) fn clear_scope(&mut self) {
        self.inner.controller = None;
    }

    pub(crate) fn set_auth(&mut self, kind: Option<TokenKind>, token: Option<String>) {
        self.inner.token_kind = kind;
        self.inner.token = token;
    }

    /// The `authorization` header value for the stored credentials.
    pub(crate) fn auth_header(&self) -> Option<String> {
        match (self.inner.token_kind, self.inner.token.as_deref()) {
            (Some(kind), Some(token)) => Some(kind.prefixed(token)),
            _ => None,
        }
    }

    pub(crate) fn set_identity(&mut self, identity: Option<CurrentUser>) {
        self.inner.identity = identity;
    }
}
