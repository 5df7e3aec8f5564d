//! Shared test support: a scripted transport and client builders.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use quill_rest::{
    ApiClient, ClientConfig, ClientError, ClientResult, Payload, RequestEnvelope, RetryConfig,
    TokenKind, Transport, TransportResponse,
};

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct Scripted {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    delay: Option<Duration>,
    fail: Option<String>,
}

impl Scripted {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
            delay: None,
            fail: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            delay: None,
            fail: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: 0,
            headers: Vec::new(),
            body: String::new(),
            delay: None,
            fail: Some(message.to_string()),
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Attach the full quota header set, with the reset `reset_in` from
    /// now.
    pub fn with_quota(self, remaining: u32, limit: u32, reset_in: Duration) -> Self {
        let reset_epoch =
            chrono::Utc::now().timestamp_millis() as f64 / 1000.0 + reset_in.as_secs_f64();
        self.with_header("x-ratelimit-remaining", &remaining.to_string())
            .with_header("x-ratelimit-limit", &limit.to_string())
            .with_header("x-ratelimit-reset", &format!("{reset_epoch}"))
    }

    pub fn with_retry_after(self, seconds: f64) -> Self {
        self.with_header("retry-after", &format!("{seconds}"))
    }
}

/// Record of one transport call.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub method: String,
    pub path: String,
    pub attempt: u32,
    pub payload: Payload,
    pub at: tokio::time::Instant,
}

/// A transport driven entirely by scripted replies.
///
/// Replies are keyed by request path and consumed in order; unscripted
/// paths get a plain `200 {}`.
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<CallRecord>>,
    auth_history: Mutex<Vec<Option<String>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            auth_history: Mutex::new(Vec::new()),
        })
    }

    /// Queue a reply for a path.
    pub fn script(&self, path: &str, response: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, path: &str) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Every value `set_authorization` was called with, in order.
    pub fn auth_history(&self) -> Vec<Option<String>> {
        self.auth_history.lock().unwrap().clone()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.auth_history.lock().unwrap().last().cloned().flatten()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn set_authorization(&self, header: Option<String>) {
        self.auth_history.lock().unwrap().push(header);
    }

    async fn send(&self, envelope: &RequestEnvelope) -> ClientResult<TransportResponse> {
        let route = envelope.route();
        self.calls.lock().unwrap().push(CallRecord {
            method: route.method().to_string(),
            path: route.path().to_string(),
            attempt: envelope.attempt(),
            payload: envelope.payload().clone(),
            at: tokio::time::Instant::now(),
        });

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(route.path())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Scripted::ok("{}"));

        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = scripted.fail {
            return Err(ClientError::Transport(message));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &scripted.headers {
            headers.insert(
                name.parse::<HeaderName>().unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }

        Ok(TransportResponse {
            status: StatusCode::from_u16(scripted.status).unwrap(),
            headers,
            body: Bytes::from(scripted.body),
        })
    }
}

/// A client over the given mock with default configuration.
pub fn client(transport: &Arc<MockTransport>) -> ApiClient {
    ApiClient::with_transport(ClientConfig::default(), transport.clone())
}

/// A client whose 429 retries use short fallback delays.
pub fn client_with_retry(transport: &Arc<MockTransport>, max_retries: u32) -> ApiClient {
    let config = ClientConfig {
        retry: RetryConfig {
            max_retries,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            multiplier: 2.0,
        },
        ..ClientConfig::default()
    };
    ApiClient::with_transport(config, transport.clone())
}

pub const IDENTITY_BODY: &str = r#"{"id":1,"username":"probe-bot","bot":true}"#;

pub fn message_body(id: u64, channel_id: u64) -> String {
    format!(
        r#"{{"id":{id},"channelId":{channel_id},"content":"hi","timestamp":"2024-05-01T12:00:00Z"}}"#
    )
}

pub fn error_body(code: &str, message: &str) -> String {
    format!(r#"{{"error":{{"code":"{code}","message":"{message}"}}}}"#)
}

/// Script a successful identity probe and log in as a bot.
pub async fn login_bot(client: &ApiClient, transport: &Arc<MockTransport>) {
    transport.script("users/@me", Scripted::ok(IDENTITY_BODY));
    client.login(TokenKind::Bot, "test-token").await.unwrap();
}

/// Opt-in test logging.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
