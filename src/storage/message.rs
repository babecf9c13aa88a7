//! Messages and the open-conversation message store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of a marketplace user (guest, host or admin)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user id from its string form
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A chat message as known to the backend
///
/// Messages are immutable once created. `listing` names the property the
/// conversation was started from, when there is one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned message ID
    pub id: String,
    /// Sending user
    pub sender: UserId,
    /// Receiving user
    pub receiver: UserId,
    /// Message text
    pub body: String,
    /// Associated listing, if any
    pub listing: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether this message was exchanged with `peer`, in either direction
    pub fn involves(&self, peer: &UserId) -> bool {
        &self.sender == peer || &self.receiver == peer
    }
}

/// Local delivery status of a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeliveryStatus {
    /// Known to the server
    #[default]
    Confirmed,
    /// Sent locally, waiting for the server's answer
    Pending,
    /// The send request failed; may be retried
    Failed,
}

/// A message held in the store, with its local delivery state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// The message itself
    pub message: Message,
    /// Delivery status
    pub status: DeliveryStatus,
    /// Local id for messages composed on this device
    pub local_id: Option<String>,
}

impl StoredMessage {
    /// Wrap a message fetched from the server
    pub fn confirmed(message: Message) -> Self {
        Self {
            message,
            status: DeliveryStatus::Confirmed,
            local_id: None,
        }
    }

    /// Wrap a locally composed message that has not been acknowledged yet
    pub fn pending(local_id: String, message: Message) -> Self {
        Self {
            message,
            status: DeliveryStatus::Pending,
            local_id: Some(local_id),
        }
    }

    /// Whether the server has not acknowledged this message
    pub fn is_unconfirmed(&self) -> bool {
        self.status != DeliveryStatus::Confirmed
    }

    /// Short status marker for list rendering
    pub fn status_indicator(&self) -> &str {
        match self.status {
            DeliveryStatus::Confirmed => "✓",
            DeliveryStatus::Pending => "↻",
            DeliveryStatus::Failed => "✗",
        }
    }
}

/// Ordered message log for the single open conversation
///
/// Readers take a [`MessageStore::snapshot`], an immutable `Arc` of the
/// whole log. `replace` builds the new log off to the side and swaps it in,
/// so no snapshot ever shows half of one fetch and half of another.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    peer: Option<UserId>,
    messages: Arc<Vec<StoredMessage>>,
}

impl MessageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Peer whose conversation the store currently holds
    pub fn peer(&self) -> Option<&UserId> {
        self.peer.as_ref()
    }

    /// Point the store at a new peer, dropping everything it held
    pub fn reset_for(&mut self, peer: UserId) {
        self.clear();
        self.peer = Some(peer);
    }

    /// Swap in a freshly fetched snapshot
    ///
    /// Server messages are replaced wholesale. Local messages whose server
    /// id does not appear in the snapshot are kept at the end: unconfirmed
    /// ones always, confirmed ones only while they are newer than anything
    /// in the snapshot (the snapshot was fetched before the send landed).
    pub fn replace(&mut self, messages: Vec<Message>) {
        let mut next: Vec<StoredMessage> = messages.into_iter().map(StoredMessage::confirmed).collect();
        next.sort_by_key(|m| m.message.created_at);
        let newest = next.last().map(|m| m.message.created_at);

        let leftovers: Vec<StoredMessage> = self
            .messages
            .iter()
            .filter(|m| m.local_id.is_some())
            .filter(|m| m.is_unconfirmed() || newest.is_none_or(|t| m.message.created_at > t))
            .filter(|m| !next.iter().any(|n| n.message.id == m.message.id))
            .cloned()
            .collect();
        next.extend(leftovers);

        self.messages = Arc::new(next);
    }

    /// Append a single message without waiting for the next snapshot
    pub fn append(&mut self, message: StoredMessage) {
        Arc::make_mut(&mut self.messages).push(message);
    }

    /// Empty the store and forget the peer
    pub fn clear(&mut self) {
        self.peer = None;
        self.messages = Arc::new(Vec::new());
    }

    /// Replace a pending local message with the server's copy
    ///
    /// If a snapshot already delivered the server copy, the local entry is
    /// dropped instead. Returns false when `local_id` is unknown.
    pub fn confirm(&mut self, local_id: &str, message: Message) -> bool {
        let already_present = self.messages.iter().any(|m| m.message.id == message.id && !m.is_unconfirmed());
        let messages = Arc::make_mut(&mut self.messages);
        let Some(pos) = messages.iter().position(|m| m.local_id.as_deref() == Some(local_id)) else {
            return false;
        };

        if already_present {
            messages.remove(pos);
        } else {
            messages[pos] = StoredMessage {
                message,
                status: DeliveryStatus::Confirmed,
                local_id: Some(local_id.to_string()),
            };
        }
        true
    }

    /// Flag a local message as failed. Returns false when unknown.
    pub fn mark_failed(&mut self, local_id: &str) -> bool {
        self.set_status(local_id, DeliveryStatus::Failed)
    }

    /// Flag a local message as pending again. Returns false when unknown.
    pub fn mark_pending(&mut self, local_id: &str) -> bool {
        self.set_status(local_id, DeliveryStatus::Pending)
    }

    fn set_status(&mut self, local_id: &str, status: DeliveryStatus) -> bool {
        match Arc::make_mut(&mut self.messages)
            .iter_mut()
            .find(|m| m.local_id.as_deref() == Some(local_id))
        {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    /// Remove a local message. Returns the removed entry.
    pub fn remove(&mut self, local_id: &str) -> Option<StoredMessage> {
        let messages = Arc::make_mut(&mut self.messages);
        let pos = messages.iter().position(|m| m.local_id.as_deref() == Some(local_id))?;
        Some(messages.remove(pos))
    }

    /// Look up a local message
    pub fn get_local(&self, local_id: &str) -> Option<&StoredMessage> {
        self.messages.iter().find(|m| m.local_id.as_deref() == Some(local_id))
    }

    /// Immutable view of the current log
    pub fn snapshot(&self) -> Arc<Vec<StoredMessage>> {
        Arc::clone(&self.messages)
    }

    /// Number of messages held
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the store holds no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
