//! Wire protocol module
//!
//! JSON shapes exchanged with the marketplace REST API and their
//! conversion into the domain types in [`crate::storage`].
//!
//! The backend answers either with a bare payload or with the payload
//! wrapped in `{"data": ...}`. [`decode_payload`] accepts exactly those two
//! shapes and fails loudly on anything else.

use crate::storage::{ConversationSummary, Message, PeerRole, UserId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors produced while decoding a response body
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// Body was not JSON at all
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    /// JSON parsed but matched neither the bare nor the wrapped shape
    #[error("unexpected response shape for {expected}: {detail}")]
    UnexpectedShape {
        /// Name of the payload that was expected
        expected: &'static str,
        /// Decoder error for the bare shape
        detail: String,
    },
    /// A field held a value the client cannot use
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

/// The two response shapes the backend uses
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    /// `{"data": payload}`
    Wrapped(T),
    /// `payload`
    Bare(T),
}

impl<T> Envelope<T> {
    /// Unwrap the payload regardless of shape
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped(inner) | Envelope::Bare(inner) => inner,
        }
    }
}

/// Decode a response body into an [`Envelope`]
///
/// An object with a `data` key is treated as wrapped and must decode as
/// `T` inside `data`; anything else must decode as a bare `T`.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8], expected: &'static str) -> Result<Envelope<T>, DecodeError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            let inner = map.remove("data").unwrap_or(Value::Null);
            serde_json::from_value(inner)
                .map(Envelope::Wrapped)
                .map_err(|e| DecodeError::UnexpectedShape {
                    expected,
                    detail: format!("in data: {}", e),
                })
        }
        other => serde_json::from_value(other)
            .map(Envelope::Bare)
            .map_err(|e| DecodeError::UnexpectedShape {
                expected,
                detail: e.to_string(),
            }),
    }
}

/// Decode a response body and return its payload
pub fn decode_payload<T: DeserializeOwned>(body: &[u8], expected: &'static str) -> Result<T, DecodeError> {
    decode_envelope(body, expected).map(Envelope::into_inner)
}

/// Reference to a document that may or may not be populated
///
/// `"sender": "abc"` and `"sender": {"_id": "abc", "name": ...}` both occur.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireRef {
    /// Plain id
    Id(String),
    /// Populated document
    Populated {
        /// Document id
        #[serde(rename = "_id")]
        id: String,
    },
}

impl WireRef {
    /// The referenced id
    pub fn id(&self) -> &str {
        match self {
            WireRef::Id(id) | WireRef::Populated { id } => id,
        }
    }
}

/// A message as sent by the backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Message id
    #[serde(rename = "_id")]
    pub id: String,
    /// Sender reference
    pub sender: WireRef,
    /// Receiver reference
    pub receiver: WireRef,
    /// Message text
    pub content: String,
    /// Associated property, if any
    #[serde(default)]
    pub property: Option<WireRef>,
    /// RFC 3339 creation timestamp
    pub created_at: String,
}

impl TryFrom<WireMessage> for Message {
    type Error = DecodeError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_rfc3339(&wire.created_at)
            .map_err(|e| DecodeError::InvalidField {
                field: "createdAt",
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);

        if wire.id.is_empty() {
            return Err(DecodeError::InvalidField {
                field: "_id",
                reason: "empty".to_string(),
            });
        }

        Ok(Message {
            id: wire.id,
            sender: UserId::new(wire.sender.id()),
            receiver: UserId::new(wire.receiver.id()),
            body: wire.content,
            listing: wire.property.map(|p| p.id().to_string()),
            created_at,
        })
    }
}

/// The peer block of a conversation entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WireUser {
    /// User id
    #[serde(rename = "_id")]
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Role string
    #[serde(default)]
    pub role: Option<String>,
}

/// Last-message preview, either a bare string or a message document
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireLastMessage {
    /// Plain text
    Text(String),
    /// Message document with a `content` field
    Document {
        /// Message text
        content: String,
    },
}

/// A conversation entry as sent by the backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConversation {
    /// The other participant
    pub user: WireUser,
    /// Unread message count
    #[serde(default)]
    pub unread_count: u32,
    /// Most recent message
    #[serde(default)]
    pub last_message: Option<WireLastMessage>,
}

impl From<WireConversation> for ConversationSummary {
    fn from(wire: WireConversation) -> Self {
        ConversationSummary {
            peer: UserId::new(wire.user.id),
            peer_name: wire.user.name,
            peer_role: wire.user.role.as_deref().map(PeerRole::parse).unwrap_or(PeerRole::Guest),
            unread: wire.unread_count,
            last_message: wire.last_message.map(|m| match m {
                WireLastMessage::Text(text) | WireLastMessage::Document { content: text } => text,
            }),
        }
    }
}

/// Body of a send-message request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Recipient
    pub receiver_id: String,
    /// Message text
    pub content: String,
    /// Associated property
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,
}

/// Decode a message list body
pub fn decode_messages(body: &[u8]) -> Result<Vec<Message>, DecodeError> {
    decode_payload::<Vec<WireMessage>>(body, "message list")?
        .into_iter()
        .map(Message::try_from)
        .collect()
}

/// Decode a single message body
pub fn decode_message(body: &[u8]) -> Result<Message, DecodeError> {
    decode_payload::<WireMessage>(body, "message")?.try_into()
}

/// Decode a conversation list body
pub fn decode_conversations(body: &[u8]) -> Result<Vec<ConversationSummary>, DecodeError> {
    Ok(decode_payload::<Vec<WireConversation>>(body, "conversation list")?
        .into_iter()
        .map(ConversationSummary::from)
        .collect())
}
