//! Authentication primitives.
//!
//! Credential kinds, the `authorization` header prefix rule, and the
//! login lifecycle states of the session.

/// Category of credential used to authenticate with the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bot token, sent as `Bot <token>`.
    Bot,
    /// OAuth bearer token, sent as `Bearer <token>`.
    Bearer,
    /// User token, sent unprefixed.
    User,
}

impl TokenKind {
    /// Build the `authorization` header value for a raw token.
    #[must_use]
    pub fn prefixed(self, token: &str) -> String {
        match self {
            Self::Bot => format!("Bot {token}"),
            Self::Bearer => format!("Bearer {token}"),
            Self::User => token.to_string(),
        }
    }
}

/// Login lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginState {
    /// No session is established.
    #[default]
    LoggedOut,
    /// A login is in progress; the identity probe has not completed yet.
    LoggingIn,
    /// The session is established and requests pass the gate.
    LoggedIn,
    /// A logout is in progress; outstanding work is being cancelled.
    LoggingOut,
}
