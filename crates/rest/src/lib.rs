//! Request-dispatch core for the Quill REST API.
//!
//! This crate turns typed operation requests from many concurrent callers
//! into correctly ordered, rate-limit-compliant, cancellable network
//! calls, while maintaining a single coherent authentication session:
//!
//! - **Session**: login/logout lifecycle under one serializing lock, with
//!   cancellation-scope ownership
//! - **RequestQueue**: per-bucket throttling, bounded 429 retries,
//!   cooperative cancellation on session changes
//! - **RateLimiter**: response-driven quota tracking per route bucket
//! - **Transport**: the wire seam, `reqwest`-backed by default
//!
//! Endpoint wrappers on [`ApiClient`] all follow one shape: validate
//! arguments locally, build a route, enqueue, decode.

pub mod auth;
pub mod bucket;
pub mod client;
pub mod codec;
pub mod model;
pub mod params;
pub mod queue;
pub mod request;
pub mod retry;
pub mod route;
pub mod scope;
pub mod session;
pub mod transport;

pub use auth::{LoginState, TokenKind};
pub use bucket::{RateLimitHeaders, RateLimiter};
pub use client::ApiClient;
pub use model::{Channel, CurrentUser, Message, User};
pub use params::{
    CreateChannelParams, CreateMessageParams, GetMessagesParams, ModifyChannelParams,
    ModifyMessageParams, UploadFileParams,
};
pub use queue::RequestQueue;
pub use request::{MultipartField, MultipartValue, Payload, RequestEnvelope};
pub use retry::RetryPolicy;
pub use route::Route;
pub use scope::CancellationScope;
pub use session::Session;
pub use transport::{HttpTransport, SharedTransport, Transport, TransportResponse};

pub use quill_common::{ApiConfig, ClientConfig, ClientError, ClientResult, RetryConfig};
