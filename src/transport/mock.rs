//! Mock transport for testing.
//!
//! Holds a scripted backend state, records every call, and can fail or
//! hold back individual requests.

use super::{AuthToken, ChatTransport, TransportError};
use crate::storage::{ConversationSummary, Message, UserId};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// In-memory backend implementing [`ChatTransport`].
///
/// Cloning shares the same backend state.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    local_user: UserId,
    conversations: Vec<ConversationSummary>,
    messages: HashMap<UserId, Vec<Message>>,
    next_id: u64,

    list_calls: usize,
    message_calls: Vec<UserId>,
    send_calls: usize,
    sent: Vec<Message>,
    mark_read_calls: Vec<UserId>,

    fail_next_list: Option<TransportError>,
    fail_next_messages: Option<TransportError>,
    fail_next_send: Option<TransportError>,
    fail_next_mark_read: Option<TransportError>,
    reject_all: bool,
    held_messages: HashMap<UserId, Arc<Notify>>,
}

impl MockTransport {
    /// Create a mock backend acting for `local_user`.
    pub fn new(local_user: impl Into<UserId>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner {
                local_user: local_user.into(),
                ..Default::default()
            })),
        }
    }

    fn inner(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the conversation list the backend reports.
    pub fn set_conversations(&self, conversations: Vec<ConversationSummary>) {
        self.inner().conversations = conversations;
    }

    /// Replace the message history with `peer`.
    pub fn set_messages(&self, peer: &UserId, messages: Vec<Message>) {
        self.inner().messages.insert(peer.clone(), messages);
    }

    /// Cause the next `list_conversations()` to fail.
    pub fn fail_next_list(&self, error: TransportError) {
        self.inner().fail_next_list = Some(error);
    }

    /// Cause the next `get_messages()` to fail.
    pub fn fail_next_messages(&self, error: TransportError) {
        self.inner().fail_next_messages = Some(error);
    }

    /// Cause the next `send_message()` to fail.
    pub fn fail_next_send(&self, error: TransportError) {
        self.inner().fail_next_send = Some(error);
    }

    /// Cause the next `mark_read()` to fail.
    pub fn fail_next_mark_read(&self, error: TransportError) {
        self.inner().fail_next_mark_read = Some(error);
    }

    /// Answer every call with `Unauthorized` while set.
    pub fn reject_credentials(&self, reject: bool) {
        self.inner().reject_all = reject;
    }

    /// Hold the next `get_messages(peer)` until the returned handle is notified.
    ///
    /// The response reflects backend state at the time of the request.
    pub fn hold_messages(&self, peer: &UserId) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner().held_messages.insert(peer.clone(), Arc::clone(&gate));
        gate
    }

    /// Number of `list_conversations()` calls so far.
    pub fn list_calls(&self) -> usize {
        self.inner().list_calls
    }

    /// Peers passed to `get_messages()`, in call order.
    pub fn message_calls(&self) -> Vec<UserId> {
        self.inner().message_calls.clone()
    }

    /// Messages accepted by `send_message()`.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.inner().sent.clone()
    }

    /// Peers passed to `mark_read()`, in call order.
    pub fn mark_read_calls(&self) -> Vec<UserId> {
        self.inner().mark_read_calls.clone()
    }

    /// Total number of transport calls of any kind.
    pub fn total_calls(&self) -> usize {
        let inner = self.inner();
        inner.list_calls + inner.message_calls.len() + inner.send_calls + inner.mark_read_calls.len()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn list_conversations(&self, _token: &AuthToken) -> Result<Vec<ConversationSummary>, TransportError> {
        let mut inner = self.inner();
        inner.list_calls += 1;
        if inner.reject_all {
            return Err(TransportError::Unauthorized);
        }
        if let Some(err) = inner.fail_next_list.take() {
            return Err(err);
        }
        Ok(inner.conversations.clone())
    }

    async fn get_messages(&self, peer: &UserId, _token: &AuthToken) -> Result<Vec<Message>, TransportError> {
        let (result, gate) = {
            let mut inner = self.inner();
            inner.message_calls.push(peer.clone());
            let gate = inner.held_messages.remove(peer);
            let result = if inner.reject_all {
                Err(TransportError::Unauthorized)
            } else if let Some(err) = inner.fail_next_messages.take() {
                Err(err)
            } else {
                Ok(inner.messages.get(peer).cloned().unwrap_or_default())
            };
            (result, gate)
        };

        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn send_message(
        &self,
        peer: &UserId,
        body: &str,
        _token: &AuthToken,
        listing: Option<&str>,
    ) -> Result<Message, TransportError> {
        let mut inner = self.inner();
        inner.send_calls += 1;
        if inner.reject_all {
            return Err(TransportError::Unauthorized);
        }
        if let Some(err) = inner.fail_next_send.take() {
            return Err(err);
        }

        inner.next_id += 1;
        let message = Message {
            id: format!("srv-{}", inner.next_id),
            sender: inner.local_user.clone(),
            receiver: peer.clone(),
            body: body.to_string(),
            listing: listing.map(str::to_string),
            created_at: Utc::now(),
        };
        inner.messages.entry(peer.clone()).or_default().push(message.clone());
        inner.sent.push(message.clone());
        Ok(message)
    }

    async fn mark_read(&self, peer: &UserId, _token: &AuthToken) -> Result<(), TransportError> {
        let mut inner = self.inner();
        inner.mark_read_calls.push(peer.clone());
        if inner.reject_all {
            return Err(TransportError::Unauthorized);
        }
        if let Some(err) = inner.fail_next_mark_read.take() {
            return Err(err);
        }
        if let Some(entry) = inner.conversations.iter_mut().find(|c| &c.peer == peer) {
            entry.unread = 0;
        }
        Ok(())
    }
}
