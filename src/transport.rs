//! Messaging transport module
//!
//! This module defines the contract the sync engine consumes:
//! - `ChatTransport` - list conversations, fetch, send, mark read
//! - `HttpTransport` - the marketplace REST binding over `reqwest`
//! - `MockTransport` - scripted in-memory backend for tests and demos
//!
//! Every call takes the bearer credential explicitly. Base URL and timeouts
//! are fixed when the transport is built; nothing is read from globals.

mod mock;

pub use mock::MockTransport;

use crate::{
    protocol::{self, DecodeError, SendMessageRequest},
    storage::{ConversationSummary, Message, Settings, UserId},
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Transport errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out
    #[error("request timed out")]
    Timeout,

    /// The server rejected the credential
    #[error("unauthorized")]
    Unauthorized,

    /// Non-success HTTP status
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// Response body did not decode
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Transport could not be configured
    #[error("invalid transport config: {0}")]
    Config(String),
}

impl TransportError {
    /// Whether this error means the credential is missing or expired
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Unauthorized)
    }
}

/// Bearer credential
///
/// `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a raw token string
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building the Authorization header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Who the engine acts for
#[derive(Debug, Clone)]
pub struct Session {
    /// Local user id
    pub user_id: UserId,
    /// Bearer credential, absent when signed out
    pub token: Option<AuthToken>,
}

impl Session {
    /// A signed-in session
    pub fn new(user_id: impl Into<UserId>, token: AuthToken) -> Self {
        Self {
            user_id: user_id.into(),
            token: Some(token),
        }
    }

    /// A session with no credential
    pub fn signed_out(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            token: None,
        }
    }
}

/// Messaging backend consumed by the sync engine
///
/// A push-based backend can implement this too; the engine only relies on
/// the four calls below.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// All conversations the caller participates in
    async fn list_conversations(&self, token: &AuthToken) -> Result<Vec<ConversationSummary>, TransportError>;

    /// Messages exchanged with `peer`, oldest first
    async fn get_messages(&self, peer: &UserId, token: &AuthToken) -> Result<Vec<Message>, TransportError>;

    /// Send a message to `peer`, optionally about a listing
    async fn send_message(
        &self,
        peer: &UserId,
        body: &str,
        token: &AuthToken,
        listing: Option<&str>,
    ) -> Result<Message, TransportError>;

    /// Mark everything from `peer` as read
    async fn mark_read(&self, peer: &UserId, token: &AuthToken) -> Result<(), TransportError>;
}

/// Longest response excerpt kept in a `Status` error
const ERROR_BODY_LIMIT: usize = 200;

/// REST transport for the marketplace API
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport for `base_url` (e.g. "https://api.example.com/api")
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransportError::Config(format!("invalid base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::Config(format!("{} cannot be a base URL", base_url)));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Create a transport from client settings
    pub fn from_settings(settings: &Settings) -> Result<Self, TransportError> {
        Self::new(&settings.api_base_url, settings.request_timeout())
    }

    /// Base URL requests are built from
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL, escaping each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and return the body of a successful response
    async fn execute(
        &self,
        method: Method,
        url: Url,
        token: &AuthToken,
        json: Option<&SendMessageRequest>,
    ) -> Result<Vec<u8>, TransportError> {
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, url.clone()).bearer_auth(token.expose());
        if let Some(body) = json {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!("{} rejected credential ({})", url, status);
            return Err(TransportError::Unauthorized);
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            let mut message = String::from_utf8_lossy(&body).into_owned();
            if message.len() > ERROR_BODY_LIMIT {
                let cut = (0..=ERROR_BODY_LIMIT).rev().find(|i| message.is_char_boundary(*i)).unwrap_or(0);
                message.truncate(cut);
            }
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body.to_vec())
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn list_conversations(&self, token: &AuthToken) -> Result<Vec<ConversationSummary>, TransportError> {
        let url = self.endpoint(&["messages", "conversations"])?;
        let body = self.execute(Method::GET, url, token, None).await?;
        Ok(protocol::decode_conversations(&body)?)
    }

    async fn get_messages(&self, peer: &UserId, token: &AuthToken) -> Result<Vec<Message>, TransportError> {
        let url = self.endpoint(&["messages", peer.as_str()])?;
        let body = self.execute(Method::GET, url, token, None).await?;
        Ok(protocol::decode_messages(&body)?)
    }

    async fn send_message(
        &self,
        peer: &UserId,
        body: &str,
        token: &AuthToken,
        listing: Option<&str>,
    ) -> Result<Message, TransportError> {
        let url = self.endpoint(&["messages"])?;
        let request = SendMessageRequest {
            receiver_id: peer.as_str().to_string(),
            content: body.to_string(),
            property_id: listing.map(str::to_string),
        };
        let response = self.execute(Method::POST, url, token, Some(&request)).await?;
        Ok(protocol::decode_message(&response)?)
    }

    async fn mark_read(&self, peer: &UserId, token: &AuthToken) -> Result<(), TransportError> {
        let url = self.endpoint(&["messages", "read", peer.as_str()])?;
        self.execute(Method::PUT, url, token, None).await?;
        Ok(())
    }
}
