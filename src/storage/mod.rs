//! Local state module
//!
//! This module holds the in-memory state the sync engine keeps in step
//! with the backend, plus client configuration:
//! - `message` - Messages, delivery status and the open-conversation store
//! - `conversation` - Conversation summaries and the conversation index
//! - `settings` - Client settings loaded from JSON

pub mod conversation;
pub mod message;
pub mod settings;

pub use conversation::{ConversationIndex, ConversationSummary, IndexOrdering, PeerRole};
pub use message::{DeliveryStatus, Message, MessageStore, StoredMessage, UserId};
pub use settings::Settings;
