//! Shared fixtures for sync tests

use crate::engine::{EngineOptions, SyncEngine};
use crate::storage::{ConversationSummary, Message, PeerRole, UserId};
use crate::transport::{AuthToken, MockTransport, Session};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

/// Local user every test engine acts for
pub const ME: &str = "guest-1";

/// Build a message at `minute` minutes past a fixed base time
pub fn message(id: &str, sender: &str, receiver: &str, body: &str, minute: u32) -> Message {
    Message {
        id: id.to_string(),
        sender: UserId::new(sender),
        receiver: UserId::new(receiver),
        body: body.to_string(),
        listing: None,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
    }
}

/// Build a conversation summary with `peer`
pub fn summary(peer: &str, unread: u32) -> ConversationSummary {
    ConversationSummary {
        peer: UserId::new(peer),
        peer_name: format!("{} name", peer),
        peer_role: PeerRole::Host,
        unread,
        last_message: None,
    }
}

/// Two-message exchange between the local user and `peer`
pub fn exchange(peer: &str) -> Vec<Message> {
    vec![
        message(&format!("{}-1", peer), peer, ME, "Hi, the flat is available", 0),
        message(&format!("{}-2", ME), ME, peer, "Great, booking now", 1),
    ]
}

/// Engine over a fresh mock backend with a valid credential
pub fn engine_with(options: EngineOptions) -> (SyncEngine, MockTransport) {
    let mock = MockTransport::new(ME);
    let session = Session::new(ME, AuthToken::new("test-token"));
    let engine = SyncEngine::new(Arc::new(mock.clone()), session, options);
    (engine, mock)
}

/// Engine with default options
pub fn engine() -> (SyncEngine, MockTransport) {
    engine_with(EngineOptions::default())
}

/// Engine that never auto-opens a conversation
pub fn narrow_engine() -> (SyncEngine, MockTransport) {
    engine_with(EngineOptions {
        narrow_viewport: true,
        ..EngineOptions::default()
    })
}
