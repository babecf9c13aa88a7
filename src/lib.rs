//! StaySync - conversation sync for a lodging marketplace client
//!
//! This library keeps a renter's (or host's) conversation list and the
//! currently open conversation in step with the marketplace REST backend.
//! Updates arrive by polling; refreshes are held back while the local user
//! is composing so the view never jumps under their cursor.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod protocol;
pub mod reconciler;
pub mod scheduler;
pub mod storage;
pub mod transport;

pub use engine::{EngineOptions, LoadKind, PollOutcome, SyncEngine, SyncEvent, SyncPhase, SyncState};
pub use storage::{ConversationIndex, ConversationSummary, Message, MessageStore, Settings, UserId};
pub use transport::{AuthToken, ChatTransport, HttpTransport, MockTransport, Session, TransportError};

/// Result type alias for StaySync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for StaySync operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// No usable credential; the caller must sign in again
    #[error("Authentication required")]
    AuthRequired,

    /// An operation needed an open conversation but none is open
    #[error("No conversation is open")]
    NoOpenConversation,

    /// A local message id did not match any retryable message
    #[error("Unknown local message: {0}")]
    UnknownLocalMessage(String),

    /// Invalid input from the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Initialize the StaySync library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}

#[cfg(test)]
mod tests;
