//! API client.
//!
//! Owns the session, the request queue, and the transport, and exposes
//! the endpoint wrappers. Every wrapper follows the same shape: validate
//! arguments locally, build a route, hand an envelope to the queue,
//! decode the result.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use validator::Validate;

use quill_common::{ClientConfig, ClientError, ClientResult};

use crate::auth::{LoginState, TokenKind};
use crate::codec;
use crate::model::{Channel, CurrentUser, Message, User};
use crate::params::{
    CreateChannelParams, CreateMessageParams, GetMessagesParams, MAX_MESSAGES_PER_BATCH,
    ModifyChannelParams, ModifyMessageParams, UploadFileParams,
};
use crate::queue::RequestQueue;
use crate::request::{MultipartField, MultipartValue, RequestEnvelope};
use crate::retry::RetryPolicy;
use crate::route::Route;
use crate::session::{Session, SessionTransition};
use crate::transport::{HttpTransport, SharedTransport, TransportResponse};

/// The API client.
///
/// One client instance holds one [`Session`]; all endpoint calls pass
/// through its [`RequestQueue`].
pub struct ApiClient {
    config: ClientConfig,
    transport: SharedTransport,
    queue: RequestQueue,
    session: Arc<Session>,
}

impl ApiClient {
    /// Build a client with the default HTTP transport.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let transport: SharedTransport = Arc::new(HttpTransport::new(&config.api)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Build a client over a caller-supplied transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: SharedTransport) -> Self {
        let session = Arc::new(Session::new());
        let retry = RetryPolicy::new(&config.retry);
        let queue = RequestQueue::new(Arc::clone(&transport), retry, session.gate());
        Self {
            config,
            transport,
            queue,
            session,
        }
    }

    /// The client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The request queue.
    #[must_use]
    pub const fn request_queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Current login state.
    #[must_use]
    pub fn login_state(&self) -> LoginState {
        self.session.login_state()
    }

    /// Identity of the logged-in account, if any.
    pub async fn current_user(&self) -> Option<CurrentUser> {
        self.session.identity().await
    }

    // === Session ===

    /// Log in with the given credentials.
    ///
    /// Serializes against concurrent login/logout calls. An established
    /// session is logged out first. On any failure the session rolls back
    /// to `LoggedOut`; a half-authenticated state is never left behind.
    pub async fn login(&self, kind: TokenKind, token: &str) -> ClientResult<()> {
        let mut transition = self.session.transition().await;
        self.login_locked(&mut transition, kind, token).await
    }

    async fn login_locked(
        &self,
        transition: &mut SessionTransition<'_>,
        kind: TokenKind,
        token: &str,
    ) -> ClientResult<()> {
        if transition.state() != LoginState::LoggedOut {
            self.logout_locked(transition).await;
        }
        transition.set_state(LoginState::LoggingIn);

        // Supersede the previous scope before credentials change hands;
        // work from the old session must not ride on the new one.
        let scope = transition.install_scope();
        transition.set_auth(Some(TokenKind::User), None);
        self.queue.set_scope(scope).await;
        self.transport.set_authorization(None).await;

        transition.set_auth(Some(kind), Some(token.to_string()));
        self.transport
            .set_authorization(transition.auth_header())
            .await;

        match self.probe_identity().await {
            Ok(identity) => {
                tracing::info!(user_id = identity.id, "Logged in");
                transition.set_identity(Some(identity));
                transition.set_state(LoginState::LoggedIn);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "Identity probe failed, rolling back login");
                self.logout_locked(transition).await;
                Err(ClientError::LoginFailed(Box::new(err)))
            }
        }
    }

    /// Log out, cancelling all outstanding requests.
    ///
    /// No-op when already logged out. The cancellation signal itself is
    /// best-effort; nothing here fails.
    pub async fn logout(&self) {
        let mut transition = self.session.transition().await;
        self.logout_locked(&mut transition).await;
    }

    async fn logout_locked(&self, transition: &mut SessionTransition<'_>) {
        if transition.state() == LoginState::LoggedOut {
            return;
        }
        transition.set_state(LoginState::LoggingOut);

        transition.cancel_scope();
        self.queue.clear().await;
        transition.clear_scope();

        self.transport.set_authorization(None).await;
        transition.set_auth(None, None);
        transition.set_identity(None);
        transition.set_state(LoginState::LoggedOut);
        tracing::info!("Logged out");
    }

    /// Check that the stored token is still accepted by the server.
    pub async fn validate_token(&self) -> ClientResult<()> {
        self.send(Route::new(Method::GET, "auth/session", "auth/session"))
            .await
    }

    async fn probe_identity(&self) -> ClientResult<CurrentUser> {
        let envelope =
            RequestEnvelope::new(Route::new(Method::GET, "users/@me", "users/@me"))
                .ignore_session_check();
        let response = self.request(envelope).await?;
        codec::decode(&response.body)
    }

    // === Send layer ===

    async fn request(&self, envelope: RequestEnvelope) -> ClientResult<TransportResponse> {
        let method = envelope.route().method().clone();
        let path = envelope.route().path().to_owned();
        let started = std::time::Instant::now();

        let response = self.queue.enqueue(envelope).await?;

        tracing::debug!(
            %method,
            %path,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );
        Ok(response)
    }

    /// Status-only call with no body.
    async fn send(&self, route: Route) -> ClientResult<()> {
        self.request(RequestEnvelope::new(route).header_only())
            .await
            .map(drop)
    }

    /// Typed GET-style call with no body.
    async fn fetch<T: DeserializeOwned>(&self, route: Route) -> ClientResult<T> {
        let response = self.request(RequestEnvelope::new(route)).await?;
        codec::decode(&response.body)
    }

    /// Typed call with a JSON body, serialized once up front.
    async fn fetch_json<T: DeserializeOwned, B: Serialize>(
        &self,
        route: Route,
        body: &B,
    ) -> ClientResult<T> {
        let body = codec::encode(body)?;
        let response = self.request(RequestEnvelope::with_json(route, body)).await?;
        codec::decode(&response.body)
    }

    /// Typed call with a multipart body.
    async fn fetch_multipart<T: DeserializeOwned>(
        &self,
        route: Route,
        fields: Vec<MultipartField>,
    ) -> ClientResult<T> {
        let response = self
            .request(RequestEnvelope::with_multipart(route, fields))
            .await?;
        codec::decode(&response.body)
    }

    // === Current user ===

    /// Fetch the logged-in account.
    pub async fn get_current_user(&self) -> ClientResult<CurrentUser> {
        self.fetch(Route::new(Method::GET, "users/@me", "users/@me"))
            .await
    }

    // === Channels ===

    /// Fetch a channel. A missing channel is an absent result, not an
    /// error.
    pub async fn get_channel(&self, channel_id: u64) -> ClientResult<Option<Channel>> {
        require_id(channel_id, "channel_id")?;
        optional(
            self.fetch(Route::new(
                Method::GET,
                "channels/{id}",
                format!("channels/{channel_id}"),
            ))
            .await,
        )
    }

    /// Create a channel.
    pub async fn create_channel(&self, params: &CreateChannelParams) -> ClientResult<Channel> {
        params.validate()?;
        self.fetch_json(Route::new(Method::POST, "channels", "channels"), params)
            .await
    }

    /// Modify a channel.
    pub async fn modify_channel(
        &self,
        channel_id: u64,
        params: &ModifyChannelParams,
    ) -> ClientResult<Channel> {
        require_id(channel_id, "channel_id")?;
        params.validate()?;
        self.fetch_json(
            Route::new(
                Method::PATCH,
                "channels/{id}",
                format!("channels/{channel_id}"),
            ),
            params,
        )
        .await
    }

    /// Delete a channel, returning it. A missing channel is an error
    /// here; mutations never convert 404.
    pub async fn delete_channel(&self, channel_id: u64) -> ClientResult<Channel> {
        require_id(channel_id, "channel_id")?;
        self.fetch(Route::new(
            Method::DELETE,
            "channels/{id}",
            format!("channels/{channel_id}"),
        ))
        .await
    }

    // === Channel messages ===

    /// Fetch a single message. A missing message is an absent result.
    pub async fn get_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> ClientResult<Option<Message>> {
        require_id(channel_id, "channel_id")?;
        require_id(message_id, "message_id")?;
        optional(
            self.fetch(Route::new(
                Method::GET,
                "channels/{id}/messages/{id}",
                format!("channels/{channel_id}/messages/{message_id}"),
            ))
            .await,
        )
    }

    /// List messages in a channel.
    pub async fn get_messages(
        &self,
        channel_id: u64,
        params: GetMessagesParams,
    ) -> ClientResult<Vec<Message>> {
        require_id(channel_id, "channel_id")?;
        params.validate()?;
        if params.before.is_some() && params.after.is_some() {
            return Err(ClientError::Validation(
                "before and after are mutually exclusive".to_string(),
            ));
        }

        let limit = params.limit.unwrap_or(MAX_MESSAGES_PER_BATCH);
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("limit", &limit.to_string());
        if let Some(before) = params.before {
            query.append_pair("before", &before.to_string());
        }
        if let Some(after) = params.after {
            query.append_pair("after", &after.to_string());
        }

        self.fetch(Route::new(
            Method::GET,
            "channels/{id}/messages",
            format!("channels/{channel_id}/messages?{}", query.finish()),
        ))
        .await
    }

    /// Post a message to a channel.
    pub async fn create_message(
        &self,
        channel_id: u64,
        params: &CreateMessageParams,
    ) -> ClientResult<Message> {
        require_id(channel_id, "channel_id")?;
        params.validate()?;
        self.fetch_json(
            Route::new(
                Method::POST,
                "channels/{id}/messages",
                format!("channels/{channel_id}/messages"),
            ),
            params,
        )
        .await
    }

    /// Edit a message.
    pub async fn modify_message(
        &self,
        channel_id: u64,
        message_id: u64,
        params: &ModifyMessageParams,
    ) -> ClientResult<Message> {
        require_id(channel_id, "channel_id")?;
        require_id(message_id, "message_id")?;
        params.validate()?;
        self.fetch_json(
            Route::new(
                Method::PATCH,
                "channels/{id}/messages/{id}",
                format!("channels/{channel_id}/messages/{message_id}"),
            ),
            params,
        )
        .await
    }

    /// Delete a message. Success is signaled purely by status; a missing
    /// message propagates as a 404 error.
    pub async fn delete_message(&self, channel_id: u64, message_id: u64) -> ClientResult<()> {
        require_id(channel_id, "channel_id")?;
        require_id(message_id, "message_id")?;
        self.send(Route::new(
            Method::DELETE,
            "channels/{id}/messages/{id}",
            format!("channels/{channel_id}/messages/{message_id}"),
        ))
        .await
    }

    /// Upload a file, with optional accompanying text.
    pub async fn upload_file(
        &self,
        channel_id: u64,
        params: &UploadFileParams,
    ) -> ClientResult<Message> {
        require_id(channel_id, "channel_id")?;
        params.validate()?;

        let mut fields = Vec::new();
        if let Some(content) = &params.content {
            fields.push(MultipartField {
                name: "content".to_string(),
                value: MultipartValue::Text(content.clone()),
            });
        }
        fields.push(MultipartField {
            name: "file".to_string(),
            value: MultipartValue::File {
                filename: params.filename.clone(),
                content_type: params.content_type.clone(),
                data: params.data.clone(),
            },
        });

        self.fetch_multipart(
            Route::new(
                Method::POST,
                "channels/{id}/messages",
                format!("channels/{channel_id}/messages"),
            ),
            fields,
        )
        .await
    }

    /// Show the typing indicator in a channel.
    pub async fn trigger_typing(&self, channel_id: u64) -> ClientResult<()> {
        require_id(channel_id, "channel_id")?;
        self.send(Route::new(
            Method::POST,
            "channels/{id}/typing",
            format!("channels/{channel_id}/typing"),
        ))
        .await
    }

    // === Users ===

    /// Fetch a user. A missing user is an absent result.
    pub async fn get_user(&self, user_id: u64) -> ClientResult<Option<User>> {
        require_id(user_id, "user_id")?;
        optional(
            self.fetch(Route::new(
                Method::GET,
                "users/{id}",
                format!("users/{user_id}"),
            ))
            .await,
        )
    }

    /// Search users by name.
    pub async fn query_users(&self, query: &str, limit: u32) -> ClientResult<Vec<User>> {
        if query.trim().is_empty() {
            return Err(ClientError::Validation(
                "query must not be empty".to_string(),
            ));
        }

        let mut encoded = url::form_urlencoded::Serializer::new(String::new());
        encoded.append_pair("q", query);
        encoded.append_pair("limit", &limit.to_string());

        self.fetch(Route::new(
            Method::GET,
            "users",
            format!("users?{}", encoded.finish()),
        ))
        .await
    }
}

/// Reject a zero id before any network call.
fn require_id(value: u64, name: &str) -> ClientResult<()> {
    if value == 0 {
        return Err(ClientError::Validation(format!(
            "{name} must be non-zero"
        )));
    }
    Ok(())
}

/// Resolve a 404 into an absent result at the calling-operation boundary.
fn optional<T>(result: ClientResult<T>) -> ClientResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
