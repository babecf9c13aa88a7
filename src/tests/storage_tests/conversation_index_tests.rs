// Conversation Index Tests - ordering policy, lookup and unread counters

use crate::storage::{ConversationIndex, IndexOrdering, UserId};
use crate::tests::helpers::summary;

fn peers(index: &ConversationIndex) -> Vec<String> {
    index.iter().map(|c| c.peer.to_string()).collect()
}

#[test]
fn test_unread_first_ordering() {
    let mut index = ConversationIndex::new(IndexOrdering::UnreadFirst);
    index.upsert_all(vec![summary("a", 0), summary("b", 5), summary("c", 2)]);

    assert_eq!(peers(&index), vec!["b", "c", "a"]);
    assert_eq!(index.first().map(|c| c.peer.as_str()), Some("b"));
}

#[test]
fn test_unread_first_keeps_server_order_for_ties() {
    let mut index = ConversationIndex::new(IndexOrdering::UnreadFirst);
    index.upsert_all(vec![summary("x", 1), summary("y", 0), summary("z", 1), summary("w", 0)]);

    assert_eq!(peers(&index), vec!["x", "z", "y", "w"]);
}

#[test]
fn test_server_ordering() {
    let mut index = ConversationIndex::new(IndexOrdering::ServerOrder);
    index.upsert_all(vec![summary("a", 0), summary("b", 5), summary("c", 2)]);

    assert_eq!(peers(&index), vec!["a", "b", "c"]);
    assert_eq!(index.ordering(), IndexOrdering::ServerOrder);
}

#[test]
fn test_upsert_all_replaces_previous_entries() {
    let mut index = ConversationIndex::default();
    index.upsert_all(vec![summary("a", 1), summary("b", 1)]);
    index.upsert_all(vec![summary("c", 0)]);

    assert_eq!(peers(&index), vec!["c"]);
    assert!(index.find(&UserId::new("a")).is_none());
}

#[test]
fn test_upsert_all_drops_duplicate_peers() {
    let mut index = ConversationIndex::default();
    index.upsert_all(vec![summary("a", 3), summary("a", 7)]);

    assert_eq!(index.len(), 1);
    assert_eq!(index.find(&UserId::new("a")).map(|c| c.unread), Some(3));
}

#[test]
fn test_find() {
    let mut index = ConversationIndex::default();
    index.upsert_all(vec![summary("a", 1)]);

    let found = index.find(&UserId::new("a")).expect("peer should be indexed");
    assert_eq!(found.peer_name, "a name");
    assert!(index.find(&UserId::new("missing")).is_none());
}

#[test]
fn test_zero_unread() {
    let mut index = ConversationIndex::default();
    index.upsert_all(vec![summary("a", 4), summary("b", 2)]);

    assert_eq!(index.zero_unread(&UserId::new("a")), Some(4));
    assert_eq!(index.find(&UserId::new("a")).map(|c| c.unread), Some(0));
    assert_eq!(index.zero_unread(&UserId::new("a")), Some(0));
    assert_eq!(index.zero_unread(&UserId::new("missing")), None);
    // Order is only recomputed on the next snapshot
    assert_eq!(peers(&index), vec!["a", "b"]);
}

#[test]
fn test_total_unread() {
    let mut index = ConversationIndex::default();
    assert_eq!(index.total_unread(), 0);
    assert!(index.is_empty());

    index.upsert_all(vec![summary("a", 4), summary("b", 2), summary("c", 0)]);
    assert_eq!(index.total_unread(), 6);
    assert_eq!(index.to_vec().len(), 3);
}

#[test]
fn test_total_unread_saturates() {
    let mut index = ConversationIndex::default();
    index.upsert_all(vec![summary("a", u32::MAX), summary("b", 1)]);

    assert_eq!(index.total_unread(), u32::MAX);
}
