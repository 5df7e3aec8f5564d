//! Rate-limit-aware request queue.
//!
//! The dispatcher every endpoint call passes through. Envelopes arrive
//! from arbitrary concurrent callers; the queue applies the session gate,
//! the per-bucket rate limiter, and the bounded 429 retry policy, and
//! guarantees that a superseded cancellation scope resolves every wait
//! with `Cancelled` instead of letting stale work proceed.

use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::StatusCode;
use tokio::sync::{RwLock, watch};

use quill_common::{ClientError, ClientResult};

use crate::auth::LoginState;
use crate::bucket::{RateLimiter, retry_after};
use crate::request::RequestEnvelope;
use crate::retry::RetryPolicy;
use crate::scope::CancellationScope;
use crate::transport::{SharedTransport, TransportResponse};

/// The request dispatcher.
///
/// Requests to different buckets proceed independently and in parallel;
/// requests sharing a bucket contend only on that bucket's own state. No
/// FIFO order is guaranteed within a bucket, only eventual admission.
pub struct RequestQueue {
    transport: SharedTransport,
    limiter: RateLimiter,
    retry: RetryPolicy,
    gate: watch::Receiver<LoginState>,
    scope: RwLock<CancellationScope>,
    pending: AtomicUsize,
}

impl RequestQueue {
    pub(crate) fn new(
        transport: SharedTransport,
        retry: RetryPolicy,
        gate: watch::Receiver<LoginState>,
    ) -> Self {
        Self {
            transport,
            limiter: RateLimiter::new(),
            retry,
            gate,
            scope: RwLock::new(CancellationScope::detached()),
            pending: AtomicUsize::new(0),
        }
    }

    /// The bucket table.
    ///
    /// Quotas persist across logout/login; they are per-route, not
    /// per-session.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Replace the cancellation scope attached to newly enqueued work.
    pub(crate) async fn set_scope(&self, scope: CancellationScope) {
        *self.scope.write().await = scope;
    }

    /// Cancel-and-drain entry point for logout.
    ///
    /// Outstanding items observe their superseded scope and complete with
    /// `Cancelled`; the scope reference resets to a detached one. The
    /// bucket table is left untouched.
    pub(crate) async fn clear(&self) {
        *self.scope.write().await = CancellationScope::detached();
        let outstanding = self.pending.load(Ordering::SeqCst);
        if outstanding > 0 {
            tracing::debug!(outstanding, "Cleared request queue");
        }
    }

    /// Dispatch one envelope.
    ///
    /// Returns the raw response on any 2xx; everything else maps to the
    /// error taxonomy. Only 429s are retried, up to the policy budget.
    pub async fn enqueue(&self, envelope: RequestEnvelope) -> ClientResult<TransportResponse> {
        if !envelope.ignores_session_check() && *self.gate.borrow() != LoginState::LoggedIn {
            return Err(ClientError::NotAuthenticated);
        }

        // The scope is bound once, at submission; a login that supersedes
        // it mid-flight cancels this item even though the queue already
        // carries the newer scope.
        let scope = self.scope.read().await.clone();
        let bucket = envelope.route().bucket().to_owned();
        let _pending = PendingGuard::enter(&self.pending);
        let mut envelope = envelope;

        loop {
            if scope.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            self.limiter.acquire(&bucket, &scope).await?;

            let response = tokio::select! {
                result = self.transport.send(&envelope) => result?,
                () = scope.cancelled() => {
                    tracing::debug!(%bucket, "Request cancelled while in flight");
                    return Err(ClientError::Cancelled);
                }
            };

            let status = response.status;
            self.limiter.note_response(&bucket, &response.headers).await;

            // A response that raced with supersession must not complete
            // successfully; the quota bookkeeping above still counts.
            if scope.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let delay = retry_after(&response.headers)
                    .unwrap_or_else(|| self.retry.fallback_delay(envelope.attempt()));
                self.limiter.note_exhausted(&bucket, delay).await;

                if !self.retry.should_retry(envelope.attempt()) {
                    tracing::warn!(%bucket, attempts = envelope.attempt() + 1, "Rate limit retry budget exhausted");
                    return Err(ClientError::RateLimited {
                        bucket,
                        attempts: envelope.attempt() + 1,
                    });
                }

                tracing::warn!(
                    %bucket,
                    delay_ms = delay.as_millis() as u64,
                    attempt = envelope.attempt(),
                    "Rate limited, retrying after delay"
                );
                envelope.bump_attempt();

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = scope.cancelled() => {
                        tracing::debug!(%bucket, "Retry wait cancelled");
                        return Err(ClientError::Cancelled);
                    }
                }
                continue;
            }

            if status.is_server_error() {
                return Err(ClientError::Server {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&response.body).into_owned(),
                });
            }

            return Err(crate::codec::api_error(status.as_u16(), &response.body));
        }
    }
}

struct PendingGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::Method;
    use reqwest::header::{HeaderMap, HeaderValue};

    use crate::bucket::headers as rl_headers;
    use crate::route::Route;
    use crate::transport::Transport;

    struct ScriptedTransport {
        responses: tokio::sync::Mutex<VecDeque<TransportResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<TransportResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: tokio::sync::Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn set_authorization(&self, _header: Option<String>) {}

        async fn send(&self, _envelope: &RequestEnvelope) -> ClientResult<TransportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| ok_response(b"{}")))
        }
    }

    fn ok_response(body: &'static [u8]) -> TransportResponse {
        TransportResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body),
        }
    }

    fn status_response(status: StatusCode, headers: HeaderMap) -> TransportResponse {
        TransportResponse {
            status,
            headers,
            body: Bytes::new(),
        }
    }

    fn retry_after_headers(secs: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(rl_headers::RETRY_AFTER, HeaderValue::from_str(secs).unwrap());
        map
    }

    fn queue(
        transport: Arc<ScriptedTransport>,
        state: LoginState,
    ) -> (RequestQueue, watch::Sender<LoginState>) {
        let (tx, rx) = watch::channel(state);
        let queue = RequestQueue::new(transport, RetryPolicy::default(), rx);
        (queue, tx)
    }

    fn envelope() -> RequestEnvelope {
        RequestEnvelope::new(Route::new(Method::GET, "channels/{id}", "channels/1"))
    }

    #[tokio::test]
    async fn test_gate_rejects_before_any_network_call() {
        let transport = ScriptedTransport::new(vec![]);
        let (queue, _tx) = queue(transport.clone(), LoginState::LoggedOut);

        let result = queue.enqueue(envelope()).await;
        assert!(matches!(result, Err(ClientError::NotAuthenticated)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_gate_rejects_while_logging_in() {
        let transport = ScriptedTransport::new(vec![]);
        let (queue, _tx) = queue(transport.clone(), LoginState::LoggingIn);

        let result = queue.enqueue(envelope()).await;
        assert!(matches!(result, Err(ClientError::NotAuthenticated)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_ignore_session_check_bypasses_gate() {
        let transport = ScriptedTransport::new(vec![ok_response(b"{}")]);
        let (queue, _tx) = queue(transport.clone(), LoginState::LoggedOut);

        let result = queue.enqueue(envelope().ignore_session_check()).await;
        assert!(result.is_ok());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_on_429_then_success() {
        let transport = ScriptedTransport::new(vec![
            status_response(StatusCode::TOO_MANY_REQUESTS, retry_after_headers("0.05")),
            ok_response(b"{}"),
        ]);
        let (queue, _tx) = queue(transport.clone(), LoginState::LoggedIn);

        let started = tokio::time::Instant::now();
        let result = queue.enqueue(envelope()).await;
        assert!(result.is_ok());
        assert_eq!(transport.calls(), 2);
        assert!(started.elapsed() >= std::time::Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion() {
        let rejections: Vec<_> = (0..8)
            .map(|_| status_response(StatusCode::TOO_MANY_REQUESTS, retry_after_headers("0.01")))
            .collect();
        let transport = ScriptedTransport::new(rejections);
        let (queue, _tx) = queue(transport.clone(), LoginState::LoggedIn);

        let result = queue.enqueue(envelope()).await;
        match result {
            Err(ClientError::RateLimited { attempts, .. }) => {
                // 1 initial + 3 retries.
                assert_eq!(attempts, 4);
            }
            other => panic!("Expected RateLimited, got {other:?}"),
        }
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![status_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
        )]);
        let (queue, _tx) = queue(transport.clone(), LoginState::LoggedIn);

        let result = queue.enqueue(envelope()).await;
        assert!(matches!(
            result,
            Err(ClientError::Server { status: 500, .. })
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_plain_4xx_maps_to_api_error() {
        let transport = ScriptedTransport::new(vec![TransportResponse {
            status: StatusCode::NOT_FOUND,
            headers: HeaderMap::new(),
            body: Bytes::from_static(br#"{"error":{"code":"NOT_FOUND","message":"gone"}}"#),
        }]);
        let (queue, _tx) = queue(transport.clone(), LoginState::LoggedIn);

        let result = queue.enqueue(envelope()).await;
        match result {
            Err(err) => {
                assert!(err.is_not_found());
            }
            Ok(_) => panic!("Expected an error"),
        }
    }
}
