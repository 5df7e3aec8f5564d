//! Error types for quill-rs.

use thiserror::Error;

/// Client result type.
pub type ClientResult<T> = Result<T, ClientError>;

/// Client error type.
///
/// Every failure surfaced by the dispatch core is one of these variants.
/// Rate-limit retries are handled internally and only become visible as
/// [`ClientError::RateLimited`] once the retry budget is exhausted.
#[derive(Debug, Error)]
pub enum ClientError {
    // === Local Errors ===
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Client is not logged in")]
    NotAuthenticated,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // === Session Errors ===
    #[error("Login failed")]
    LoginFailed(#[source] Box<ClientError>),

    #[error("Request cancelled")]
    Cancelled,

    // === Dispatch Errors ===
    #[error("Rate limit retry budget exhausted for bucket {bucket}")]
    RateLimited {
        /// Bucket key that kept rejecting the request.
        bucket: String,
        /// Attempts made, counting the initial send.
        attempts: u32,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error: {status}")]
    Server {
        /// HTTP status code (5xx).
        status: u16,
        /// Raw response body, if any.
        body: String,
    },

    #[error("API error: {status}")]
    Api {
        /// HTTP status code (4xx other than 429).
        status: u16,
        /// Platform error code, if the body carried one.
        code: Option<String>,
        /// Platform error message, if the body carried one.
        message: Option<String>,
    },

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Returns the HTTP status code attached to this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns whether this error is an HTTP 404.
    ///
    /// Single-resource fetch operations use this to resolve a missing
    /// resource into an absent result instead of an error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns whether the failure happened before any network call.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotAuthenticated | Self::InvalidUrl(_) | Self::Config(_)
        )
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for ClientError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
