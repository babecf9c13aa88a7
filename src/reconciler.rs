//! Read-state reconciliation
//!
//! Opening a conversation or replying in it acknowledges the peer's
//! messages. The local unread counter drops to zero right away; the server
//! is told afterwards. A failed acknowledgement leaves the local zero in
//! place until the next conversation snapshot says otherwise.

use crate::{
    storage::{ConversationIndex, UserId},
    transport::{AuthToken, ChatTransport, TransportError},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of acknowledging a peer's messages with the server
#[derive(Debug, Clone, PartialEq)]
pub enum ReadAck {
    /// The server accepted the acknowledgement
    Acknowledged,
    /// The call failed; the local zero stands
    Tolerated(TransportError),
}

/// Marks peers read on the server and zeroes local unread counters
#[derive(Clone)]
pub struct ReadStateReconciler {
    transport: Arc<dyn ChatTransport>,
}

impl ReadStateReconciler {
    /// Create a reconciler over `transport`
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// Zero the local unread counter for `peer`
    ///
    /// Returns the count that was cleared (0 if the peer is not indexed).
    pub fn apply_local(index: &mut ConversationIndex, peer: &UserId) -> u32 {
        let cleared = index.zero_unread(peer).unwrap_or(0);
        if cleared > 0 {
            debug!("Cleared {} unread from {}", cleared, peer);
        }
        cleared
    }

    /// Tell the server that everything from `peer` has been seen
    ///
    /// Never fails; transport errors are logged and reported as
    /// [`ReadAck::Tolerated`] so the caller can react to an expired
    /// credential.
    pub async fn acknowledge(&self, peer: &UserId, token: &AuthToken) -> ReadAck {
        match self.transport.mark_read(peer, token).await {
            Ok(()) => {
                debug!("Marked conversation with {} read", peer);
                ReadAck::Acknowledged
            }
            Err(e) => {
                warn!("Failed to mark conversation with {} read: {}", peer, e);
                ReadAck::Tolerated(e)
            }
        }
    }
}

impl std::fmt::Debug for ReadStateReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStateReconciler").finish_non_exhaustive()
    }
}
