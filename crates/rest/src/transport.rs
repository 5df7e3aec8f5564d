//! HTTP transport.
//!
//! The [`Transport`] trait is the seam between the dispatch core and the
//! wire: one method installs the `authorization` header for the current
//! session, the other sends a single request. The default implementation
//! is backed by `reqwest`; tests inject scripted implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, StatusCode};
use tokio::sync::RwLock;
use url::Url;

use quill_common::{ApiConfig, ClientError, ClientResult};

use crate::request::{MultipartField, MultipartValue, Payload, RequestEnvelope};

/// One HTTP response, fully read.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

/// Sends one HTTP request per call.
///
/// Implementations own the socket/connection pool. The dispatch core
/// never retries at this layer; transport failures surface unchanged.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Install or clear the `authorization` header applied to every
    /// subsequent request.
    async fn set_authorization(&self, header: Option<String>);

    /// Send the request described by the envelope.
    async fn send(&self, envelope: &RequestEnvelope) -> ClientResult<TransportResponse>;
}

/// Shared transport handle.
pub type SharedTransport = Arc<dyn Transport>;

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    user_agent: String,
    authorization: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Build a transport from the API configuration.
    pub fn new(config: &ApiConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        // Relative joins drop the last path segment unless the base ends
        // with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            user_agent: config.user_agent.clone(),
            authorization: RwLock::new(None),
        })
    }

    fn url_for(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    fn build_form(fields: &[MultipartField]) -> ClientResult<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for field in fields {
            let part = match &field.value {
                MultipartValue::Text(text) => reqwest::multipart::Part::text(text.clone()),
                MultipartValue::File {
                    filename,
                    content_type,
                    data,
                } => {
                    let mut part = reqwest::multipart::Part::bytes(data.to_vec())
                        .file_name(filename.clone());
                    if let Some(content_type) = content_type {
                        part = part.mime_str(content_type)?;
                    }
                    part
                }
            };
            form = form.part(field.name.clone(), part);
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn set_authorization(&self, header: Option<String>) {
        *self.authorization.write().await = header;
    }

    async fn send(&self, envelope: &RequestEnvelope) -> ClientResult<TransportResponse> {
        let route = envelope.route();
        let url = self.url_for(route.path())?;

        let mut request = self
            .client
            .request(route.method().clone(), url)
            .header(header::ACCEPT, "*/*")
            .header(header::USER_AGENT, &self.user_agent);

        if let Some(authorization) = self.authorization.read().await.clone() {
            request = request.header(header::AUTHORIZATION, authorization);
        }

        request = match envelope.payload() {
            Payload::Empty => request,
            Payload::Json(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.clone()),
            Payload::Multipart(fields) => request.multipart(Self::build_form(fields)?),
        };

        tracing::debug!(
            method = %route.method(),
            path = route.path(),
            attempt = envelope.attempt(),
            "Sending request"
        );

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
