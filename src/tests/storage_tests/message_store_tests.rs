// Message Store Tests - snapshot replace, optimistic entries, peer switching

use crate::storage::{DeliveryStatus, MessageStore, StoredMessage, UserId};
use crate::tests::helpers::{message, ME};

fn store_for(peer: &str) -> MessageStore {
    let mut store = MessageStore::new();
    store.reset_for(UserId::new(peer));
    store
}

fn bodies(store: &MessageStore) -> Vec<String> {
    store.snapshot().iter().map(|m| m.message.body.clone()).collect()
}

#[test]
fn test_new_store_is_empty() {
    let store = MessageStore::new();
    assert!(store.is_empty());
    assert_eq!(store.len(), 0);
    assert!(store.peer().is_none());
}

#[test]
fn test_replace_sorts_by_creation_time() {
    let mut store = store_for("host-a");
    store.replace(vec![
        message("m3", "host-a", ME, "third", 3),
        message("m1", "host-a", ME, "first", 1),
        message("m2", ME, "host-a", "second", 2),
    ]);

    assert_eq!(bodies(&store), vec!["first", "second", "third"]);
    assert!(store.snapshot().iter().all(|m| m.status == DeliveryStatus::Confirmed));
}

#[test]
fn test_replace_twice_with_same_snapshot_is_identical() {
    let mut store = store_for("host-a");
    let snapshot = vec![
        message("m1", "host-a", ME, "one", 1),
        message("m2", ME, "host-a", "two", 2),
        message("m3", "host-a", ME, "three", 3),
    ];

    store.replace(snapshot.clone());
    let first = store.snapshot();
    store.replace(snapshot);
    let second = store.snapshot();

    assert_eq!(*first, *second);
    assert_eq!(second.len(), 3);
}

#[test]
fn test_replace_is_not_a_merge() {
    let mut store = store_for("host-a");
    store.replace(vec![message("m1", "host-a", ME, "old", 1)]);
    store.replace(vec![message("m2", "host-a", ME, "new", 2)]);

    assert_eq!(bodies(&store), vec!["new"]);
}

#[test]
fn test_earlier_snapshot_is_unaffected_by_replace() {
    let mut store = store_for("host-a");
    store.replace(vec![message("m1", "host-a", ME, "one", 1)]);
    let before = store.snapshot();

    store.replace(vec![message("m2", "host-a", ME, "two", 2), message("m3", "host-a", ME, "three", 3)]);

    assert_eq!(before.len(), 1);
    assert_eq!(before[0].message.id, "m1");
    assert_eq!(store.len(), 2);
}

#[test]
fn test_append_adds_pending_message_at_end() {
    let mut store = store_for("host-a");
    store.replace(vec![message("m1", "host-a", ME, "hello", 1)]);
    store.append(StoredMessage::pending(
        "local-1".to_string(),
        message("local-1", ME, "host-a", "reply", 2),
    ));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[1].status, DeliveryStatus::Pending);
    assert_eq!(snapshot[1].status_indicator(), "↻");
}

#[test]
fn test_replace_keeps_unconfirmed_local_messages() {
    let mut store = store_for("host-a");
    store.append(StoredMessage::pending(
        "local-1".to_string(),
        message("local-1", ME, "host-a", "still sending", 5),
    ));
    store.append(StoredMessage::pending(
        "local-2".to_string(),
        message("local-2", ME, "host-a", "did not go through", 6),
    ));
    assert!(store.mark_failed("local-2"));

    store.replace(vec![message("m1", "host-a", ME, "hello", 1)]);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot[0].message.id, "m1");
    assert_eq!(snapshot[1].status, DeliveryStatus::Pending);
    assert_eq!(snapshot[2].status, DeliveryStatus::Failed);
}

#[test]
fn test_replace_drops_confirmed_local_messages() {
    let mut store = store_for("host-a");
    store.append(StoredMessage::pending(
        "local-1".to_string(),
        message("local-1", ME, "host-a", "hi", 1),
    ));
    assert!(store.confirm("local-1", message("srv-1", ME, "host-a", "hi", 1)));

    store.replace(vec![message("srv-1", ME, "host-a", "hi", 1)]);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].message.id, "srv-1");
    assert!(snapshot[0].local_id.is_none());
}

#[test]
fn test_replace_with_older_snapshot_keeps_just_confirmed_message() {
    let mut store = store_for("host-a");
    store.replace(vec![message("m1", "host-a", ME, "hello", 1)]);
    store.append(StoredMessage::pending(
        "local-1".to_string(),
        message("local-1", ME, "host-a", "see you", 5),
    ));
    assert!(store.confirm("local-1", message("srv-1", ME, "host-a", "see you", 5)));

    // Fetched before the send reached the server
    store.replace(vec![message("m1", "host-a", ME, "hello", 1)]);
    assert_eq!(bodies(&store), vec!["hello", "see you"]);

    // A later snapshot without it is authoritative
    store.replace(vec![
        message("m1", "host-a", ME, "hello", 1),
        message("m2", "host-a", ME, "anyone?", 7),
    ]);
    assert_eq!(bodies(&store), vec!["hello", "anyone?"]);
}

#[test]
fn test_confirm_swaps_in_server_copy() {
    let mut store = store_for("host-a");
    store.append(StoredMessage::pending(
        "local-1".to_string(),
        message("local-1", ME, "host-a", "hi", 1),
    ));

    assert!(store.confirm("local-1", message("srv-9", ME, "host-a", "hi", 1)));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].message.id, "srv-9");
    assert_eq!(snapshot[0].status, DeliveryStatus::Confirmed);
}

#[test]
fn test_confirm_after_snapshot_already_has_message_removes_duplicate() {
    let mut store = store_for("host-a");
    store.append(StoredMessage::pending(
        "local-1".to_string(),
        message("local-1", ME, "host-a", "hi", 1),
    ));
    // A poll landed while the send was outstanding
    store.replace(vec![message("srv-9", ME, "host-a", "hi", 1)]);
    assert_eq!(store.len(), 2);

    assert!(store.confirm("local-1", message("srv-9", ME, "host-a", "hi", 1)));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].message.id, "srv-9");
}

#[test]
fn test_confirm_unknown_local_id() {
    let mut store = store_for("host-a");
    assert!(!store.confirm("nope", message("srv-1", ME, "host-a", "hi", 1)));
    assert!(!store.mark_failed("nope"));
    assert!(store.remove("nope").is_none());
}

#[test]
fn test_remove_local_message() {
    let mut store = store_for("host-a");
    store.append(StoredMessage::pending(
        "local-1".to_string(),
        message("local-1", ME, "host-a", "typo", 1),
    ));

    let removed = store.remove("local-1").expect("entry should exist");
    assert_eq!(removed.message.body, "typo");
    assert!(store.is_empty());
    assert!(store.get_local("local-1").is_none());
}

#[test]
fn test_clear_and_reset_for_new_peer() {
    let mut store = store_for("host-a");
    store.replace(vec![message("m1", "host-a", ME, "hello", 1)]);

    store.reset_for(UserId::new("host-b"));
    assert_eq!(store.peer(), Some(&UserId::new("host-b")));
    assert!(store.is_empty());

    store.clear();
    assert!(store.peer().is_none());
}

#[test]
fn test_message_involves() {
    let msg = message("m1", "host-a", ME, "hi", 1);
    assert!(msg.involves(&UserId::new("host-a")));
    assert!(msg.involves(&UserId::new(ME)));
    assert!(!msg.involves(&UserId::new("host-b")));
}
