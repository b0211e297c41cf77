use super::*;

#[test]
fn test_session_ids_are_url_safe_and_unique() {
    let table = SessionTable::new();
    let a = table.create(None);
    let b = table.create(None);

    assert_ne!(a.id, b.id);
    for id in [&a.id, &b.id] {
        assert!(!id.is_empty());
        assert!(
            id.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "session id must be URL-safe: {}",
            id
        );
    }
}

#[test]
fn test_get_refreshes_activity() {
    let table = SessionTable::new();
    let session = table.create(None);
    let before = session.idle_since();

    std::thread::sleep(std::time::Duration::from_millis(5));
    assert!(table.get(&session.id).is_some());
    assert!(session.idle_since() > before);
}

#[test]
fn test_idle_expiry_removes_session() {
    let table = SessionTable::with_idle_timeout(Duration::milliseconds(0));
    let session = table.create(None);

    std::thread::sleep(std::time::Duration::from_millis(5));
    assert!(table.get(&session.id).is_none());
    assert!(table.is_empty());
}

#[test]
fn test_sweep_returns_expired_sessions() {
    let table = SessionTable::with_idle_timeout(Duration::milliseconds(0));
    let session = table.create(Some("alice".to_string()));

    std::thread::sleep(std::time::Duration::from_millis(5));
    let expired = table.sweep();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, session.id);
    assert!(table.is_empty());
}

#[test]
fn test_remove_is_idempotent() {
    let table = SessionTable::new();
    let session = table.create(None);

    assert!(table.remove(&session.id).is_some());
    assert!(table.remove(&session.id).is_none());
}

#[tokio::test]
async fn test_notifications_buffer_until_stream_taken() {
    let table = SessionTable::new();
    let session = table.create(None);

    assert!(session.notify(JsonRpcNotification::tools_list_changed()));

    let mut stream = session.take_event_stream().expect("first take succeeds");
    let queued = stream.recv().await.unwrap();
    assert_eq!(queued.method, "notifications/tools/list_changed");

    // Only one SSE stream per session
    assert!(session.take_event_stream().is_none());
}

#[tokio::test]
async fn test_broadcast_targets_by_user() {
    let table = SessionTable::new();
    let alice = table.create(Some("alice".to_string()));
    let bob = table.create(Some("bob".to_string()));

    table.broadcast_for_user("alice", &JsonRpcNotification::tools_list_changed());

    let mut alice_stream = alice.take_event_stream().unwrap();
    assert!(alice_stream.recv().await.is_some());

    let mut bob_stream = bob.take_event_stream().unwrap();
    assert!(bob_stream.try_recv().is_err(), "bob must not be notified");
}

#[test]
fn test_preconditions_are_per_session() {
    let table = SessionTable::new();
    let a = table.create(None);
    let b = table.create(None);

    a.satisfy("read_note");
    assert!(a.satisfied("read_note"));
    assert!(!b.satisfied("read_note"));
}
