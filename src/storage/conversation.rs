//! Conversation summaries and the conversation index

use crate::storage::message::UserId;
use serde::{Deserialize, Serialize};

/// Marketplace role of a conversation peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    /// Books stays
    Guest,
    /// Lists properties
    Host,
    /// Site administrator
    Admin,
    /// Any role this client does not know about
    #[serde(untagged)]
    Other(String),
}

impl PeerRole {
    /// Parse a role string from the backend
    pub fn parse(role: &str) -> Self {
        match role.to_ascii_lowercase().as_str() {
            "guest" | "user" | "tenant" => Self::Guest,
            "host" | "owner" => Self::Host,
            "admin" => Self::Admin,
            _ => Self::Other(role.to_string()),
        }
    }
}

/// Summary of a conversation with one peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// The other participant
    pub peer: UserId,
    /// Peer display name
    pub peer_name: String,
    /// Peer role
    pub peer_role: PeerRole,
    /// Messages from the peer not yet acknowledged as read
    pub unread: u32,
    /// Preview of the most recent message
    pub last_message: Option<String>,
}

/// How the index orders conversations for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrdering {
    /// Unread count descending; server order breaks ties
    #[default]
    UnreadFirst,
    /// Keep whatever order the server returned
    ServerOrder,
}

/// All conversations the local user participates in
#[derive(Debug, Clone, Default)]
pub struct ConversationIndex {
    entries: Vec<ConversationSummary>,
    ordering: IndexOrdering,
}

impl ConversationIndex {
    /// Create an empty index with the given ordering
    pub fn new(ordering: IndexOrdering) -> Self {
        Self {
            entries: Vec::new(),
            ordering,
        }
    }

    /// Replace the index from a fetched snapshot
    ///
    /// Duplicate peers in the snapshot keep their first occurrence.
    pub fn upsert_all(&mut self, summaries: Vec<ConversationSummary>) {
        let mut entries: Vec<ConversationSummary> = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if entries.iter().any(|e| e.peer == summary.peer) {
                tracing::debug!("Dropping duplicate conversation for {}", summary.peer);
                continue;
            }
            entries.push(summary);
        }

        if self.ordering == IndexOrdering::UnreadFirst {
            // sort_by is stable, so equal counts keep server order
            entries.sort_by(|a, b| b.unread.cmp(&a.unread));
        }

        self.entries = entries;
    }

    /// Find the summary for a peer
    pub fn find(&self, peer: &UserId) -> Option<&ConversationSummary> {
        self.entries.iter().find(|e| &e.peer == peer)
    }

    /// Set a peer's unread count to zero
    ///
    /// Returns the previous count, or `None` if the peer is not indexed.
    /// Ordering is left alone until the next snapshot.
    pub fn zero_unread(&mut self, peer: &UserId) -> Option<u32> {
        let entry = self.entries.iter_mut().find(|e| &e.peer == peer)?;
        Some(std::mem::take(&mut entry.unread))
    }

    /// Highest-priority conversation
    pub fn first(&self) -> Option<&ConversationSummary> {
        self.entries.first()
    }

    /// Sum of unread counts across all conversations, saturating at `u32::MAX`
    pub fn total_unread(&self) -> u32 {
        self.entries.iter().fold(0u32, |total, e| total.saturating_add(e.unread))
    }

    /// Iterate conversations in display order
    pub fn iter(&self) -> impl Iterator<Item = &ConversationSummary> {
        self.entries.iter()
    }

    /// Clone the entries in display order
    pub fn to_vec(&self) -> Vec<ConversationSummary> {
        self.entries.clone()
    }

    /// Number of conversations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Active ordering policy
    pub fn ordering(&self) -> IndexOrdering {
        self.ordering
    }
}
