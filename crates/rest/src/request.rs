//! Request envelopes.
//!
//! A [`RequestEnvelope`] is the immutable description of one dispatchable
//! call. The three payload shapes share identical dispatch and retry
//! logic and differ only in how the transport encodes the body.

use bytes::Bytes;

use crate::route::Route;

/// Body payload of a request.
#[derive(Debug, Clone)]
pub enum Payload {
    /// No body.
    Empty,
    /// JSON body, serialized once when the envelope is built.
    Json(Bytes),
    /// Multipart form body, encoded by the transport on each attempt.
    Multipart(Vec<MultipartField>),
}

/// One field of a multipart form.
#[derive(Debug, Clone)]
pub struct MultipartField {
    /// Form field name.
    pub name: String,
    /// Field value.
    pub value: MultipartValue,
}

/// Value of a multipart form field.
#[derive(Debug, Clone)]
pub enum MultipartValue {
    /// Plain text value.
    Text(String),
    /// File attachment.
    File {
        /// File name reported to the server.
        filename: String,
        /// MIME type, if known.
        content_type: Option<String>,
        /// Raw file contents.
        data: Bytes,
    },
}

/// Immutable description of one dispatchable request.
///
/// Only `attempt` changes after construction, incremented by the queue on
/// each rate-limit retry.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    route: Route,
    payload: Payload,
    header_only: bool,
    ignore_session_check: bool,
    attempt: u32,
}

impl RequestEnvelope {
    /// Envelope with no body.
    #[must_use]
    pub const fn new(route: Route) -> Self {
        Self {
            route,
            payload: Payload::Empty,
            header_only: false,
            ignore_session_check: false,
            attempt: 0,
        }
    }

    /// Envelope with a pre-serialized JSON body.
    #[must_use]
    pub const fn with_json(route: Route, body: Bytes) -> Self {
        Self {
            route,
            payload: Payload::Json(body),
            header_only: false,
            ignore_session_check: false,
            attempt: 0,
        }
    }

    /// Envelope with a multipart form body.
    #[must_use]
    pub fn with_multipart(route: Route, fields: Vec<MultipartField>) -> Self {
        Self {
            route,
            payload: Payload::Multipart(fields),
            header_only: false,
            ignore_session_check: false,
            attempt: 0,
        }
    }

    /// Mark the response as status-only; the body is not decoded.
    #[must_use]
    pub const fn header_only(mut self) -> Self {
        self.header_only = true;
        self
    }

    /// Let the request bypass the session gate.
    ///
    /// Reserved for the identity probe and calls legitimately issuable
    /// before login completes.
    #[must_use]
    pub const fn ignore_session_check(mut self) -> Self {
        self.ignore_session_check = true;
        self
    }

    /// The route this envelope targets.
    #[must_use]
    pub const fn route(&self) -> &Route {
        &self.route
    }

    /// The body payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Whether the response body is skipped.
    #[must_use]
    pub const fn is_header_only(&self) -> bool {
        self.header_only
    }

    /// Whether the session gate is bypassed.
    #[must_use]
    pub const fn ignores_session_check(&self) -> bool {
        self.ignore_session_check
    }

    /// Attempts already made, zero before the first send.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) const fn bump_attempt(&mut self) {
        self.attempt += 1;
    }
}
