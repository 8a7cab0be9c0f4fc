use super::room::{ClientHandle, ClientKey, Room};
use super::{Hub, Message};
use crate::config::HubSettings;
use crate::utils::error::HubError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use uuid::Uuid;

fn settings() -> HubSettings {
    HubSettings {
        queue_capacity: 10,
        delivery_timeout_ms: 20,
        default_room_name: "Default Room Name".to_string(),
    }
}

fn connect_with_capacity(
    user_id: &str,
    username: &str,
    room_id: &str,
    capacity: usize,
) -> (ClientHandle, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = ClientHandle {
        key: ClientKey {
            conn_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            room_id: room_id.to_string(),
        },
        username: username.to_string(),
        sender: tx,
    };
    (handle, rx)
}

fn connect(user_id: &str, username: &str, room_id: &str) -> (ClientHandle, mpsc::Receiver<Message>) {
    connect_with_capacity(user_id, username, room_id, 10)
}

fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn contents(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.content.as_str()).collect()
}

#[test]
fn test_room_add_reports_first_connection() {
    let mut room = Room::new("r1", "Room One");
    let (first, _rx1) = connect("u1", "alice", "r1");
    let (second, _rx2) = connect("u1", "alice", "r1");

    assert!(room.add(first));
    assert!(!room.add(second));
    assert_eq!(room.member_count(), 1);
    assert_eq!(room.connection_count(), 2);
}

#[test]
fn test_room_remove_is_identity_based() {
    let mut room = Room::new("r1", "Room One");
    let (first, _rx1) = connect("u1", "alice", "r1");
    let (second, _rx2) = connect("u1", "alice", "r1");
    let first_key = first.key.clone();
    let second_key = second.key.clone();
    room.add(first);
    room.add(second);

    let (removed, last) = room.remove(&second_key).unwrap();
    assert_eq!(removed.key, second_key);
    assert!(!last);
    assert!(room.contains_user("u1"));

    let (_, last) = room.remove(&first_key).unwrap();
    assert!(last);
    assert!(!room.contains_user("u1"));
    assert!(room.members.is_empty());

    assert!(room.remove(&first_key).is_none());
}

#[tokio::test]
async fn test_register_creates_room_lazily_with_default_name() {
    let mut hub = Hub::new(&settings());
    let (alice, mut rx) = connect("u1", "alice", "r1");

    hub.register(alice).await;

    let rooms = hub.rooms();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].id, "r1");
    assert_eq!(rooms[0].name, "Default Room Name");
    assert_eq!(rooms[0].members, 1);

    let received = drain(&mut rx);
    assert_eq!(contents(&received), vec!["alice has joined the room"]);
    assert!(received[0].created_at.is_some());
}

#[tokio::test]
async fn test_second_connection_does_not_repeat_join_notice() {
    let mut hub = Hub::new(&settings());
    let (observer, mut observer_rx) = connect("u0", "carol", "r1");
    let (tab1, _rx1) = connect("u1", "alice", "r1");
    let (tab2, _rx2) = connect("u1", "alice", "r1");

    hub.register(observer).await;
    hub.register(tab1).await;
    hub.register(tab2).await;

    let received = drain(&mut observer_rx);
    assert_eq!(
        contents(&received),
        vec!["carol has joined the room", "alice has joined the room"]
    );
    assert_eq!(hub.room("r1").unwrap().connection_count(), 3);
}

#[tokio::test]
async fn test_two_connections_one_join_one_leave() {
    let mut hub = Hub::new(&settings());
    let (observer, mut observer_rx) = connect("u0", "carol", "r1");
    let (tab1, _rx1) = connect("u1", "alice", "r1");
    let (tab2, _rx2) = connect("u1", "alice", "r1");
    let key1 = tab1.key.clone();
    let key2 = tab2.key.clone();

    hub.register(observer).await;
    drain(&mut observer_rx);

    hub.register(tab1).await;
    hub.register(tab2).await;
    assert_eq!(contents(&drain(&mut observer_rx)), vec!["alice has joined the room"]);

    hub.unregister(&key1).await;
    assert!(drain(&mut observer_rx).is_empty());
    assert!(hub.room("r1").unwrap().contains_user("u1"));

    hub.unregister(&key2).await;
    assert_eq!(contents(&drain(&mut observer_rx)), vec!["alice has left the room"]);
    assert!(!hub.room("r1").unwrap().contains_user("u1"));
}

#[tokio::test]
async fn test_broadcast_preserves_submission_order() {
    let mut hub = Hub::new(&settings());
    let (alice, mut rx) = connect("u1", "alice", "r1");
    hub.register(alice).await;
    drain(&mut rx);

    for i in 0..5 {
        hub.broadcast(Message::chat(format!("msg {i}"), "r1", "u1", "alice"))
            .await;
    }

    let received = drain(&mut rx);
    assert_eq!(
        contents(&received),
        vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]
    );
}

#[tokio::test]
async fn test_broadcast_to_empty_or_unknown_room_is_noop() {
    let mut hub = Hub::new(&settings());
    hub.create_room("empty", "Empty");

    hub.broadcast(Message::chat("anyone?", "empty", "u1", "alice"))
        .await;
    hub.broadcast(Message::chat("anyone?", "missing", "u1", "alice"))
        .await;

    assert_eq!(hub.room("empty").unwrap().connection_count(), 0);
    assert!(hub.room("missing").is_none());
}

#[tokio::test]
async fn test_double_unregister_is_idempotent() {
    let mut hub = Hub::new(&settings());
    let (alice, mut alice_rx) = connect("u1", "alice", "r1");
    let (bob, mut bob_rx) = connect("u2", "bob", "r1");
    let bob_key = bob.key.clone();
    hub.register(alice).await;
    hub.register(bob).await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    hub.unregister(&bob_key).await;
    hub.unregister(&bob_key).await;

    assert_eq!(contents(&drain(&mut alice_rx)), vec!["bob has left the room"]);
    assert_eq!(bob_rx.try_recv(), Err(TryRecvError::Disconnected));

    let room = hub.room("r1").unwrap();
    assert!(room.contains_user("u1"));
    assert!(!room.contains_user("u2"));
    assert_eq!(room.connection_count(), 1);
}

#[tokio::test]
async fn test_two_users_chat_then_one_leaves() {
    let mut hub = Hub::new(&settings());
    let (alice, mut alice_rx) = connect("u1", "alice", "r1");
    let (bob, mut bob_rx) = connect("u2", "bob", "r1");
    let bob_key = bob.key.clone();

    hub.register(alice).await;
    hub.register(bob).await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    hub.broadcast(Message::chat("hello", "r1", "u1", "alice"))
        .await;

    for rx in [&mut alice_rx, &mut bob_rx] {
        let received = drain(rx);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].content, "hello");
        assert_eq!(received[0].room_id, "r1");
        assert_eq!(received[0].username, "alice");
    }

    hub.unregister(&bob_key).await;

    let received = drain(&mut alice_rx);
    assert_eq!(contents(&received), vec!["bob has left the room"]);

    let members = hub.members("r1").unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, "u1");
    assert_eq!(members[0].username, "alice");
}

#[tokio::test]
async fn test_full_queue_evicts_slow_client() {
    let mut hub = Hub::new(&settings());
    let (slow, mut slow_rx) = connect_with_capacity("u1", "slowpoke", "r1", 1);
    let (fast, mut fast_rx) = connect("u2", "bob", "r1");

    // slowpoke's own join notice fills its queue
    hub.register(slow).await;
    hub.register(fast).await;

    assert_eq!(
        contents(&drain(&mut fast_rx)),
        vec!["bob has joined the room", "slowpoke has left the room"]
    );
    assert!(!hub.room("r1").unwrap().contains_user("u1"));

    assert_eq!(
        contents(&drain(&mut slow_rx)),
        vec!["slowpoke has joined the room"]
    );
    assert_eq!(slow_rx.try_recv(), Err(TryRecvError::Disconnected));
}

#[tokio::test]
async fn test_closed_queue_is_evicted_once() {
    let mut hub = Hub::new(&settings());
    let (gone, gone_rx) = connect("u1", "ghost", "r1");
    let gone_key = gone.key.clone();
    let (bob, mut bob_rx) = connect("u2", "bob", "r1");

    hub.register(gone).await;
    hub.register(bob).await;
    drain(&mut bob_rx);

    drop(gone_rx);
    hub.broadcast(Message::chat("hi", "r1", "u2", "bob")).await;
    // the client's own cleanup arrives afterwards
    hub.unregister(&gone_key).await;

    assert_eq!(
        contents(&drain(&mut bob_rx)),
        vec!["hi", "ghost has left the room"]
    );
    assert_eq!(hub.room("r1").unwrap().member_count(), 1);
}

#[tokio::test]
async fn test_create_room_renames_and_keeps_members() {
    let mut hub = Hub::new(&settings());
    let (alice, _rx) = connect("u1", "alice", "r1");
    hub.register(alice).await;

    let summary = hub.create_room("r1", "General");
    assert_eq!(summary.name, "General");
    assert_eq!(summary.members, 1);

    hub.create_room("r0", "Lobby");
    let ids: Vec<_> = hub.rooms().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["r0", "r1"]);
}

#[tokio::test]
async fn test_handle_round_trip_through_hub_task() {
    let hub = Hub::new(&settings()).spawn();
    let (alice, mut alice_rx) = connect("u1", "alice", "r1");
    let alice_key = alice.key.clone();

    hub.create_room("r1", "General").await.unwrap();
    hub.register(alice).unwrap();
    hub.broadcast(Message::chat("hello", "r1", "u1", "alice"))
        .unwrap();

    let rooms = hub.rooms().await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].name, "General");
    assert_eq!(rooms[0].members, 1);

    assert_eq!(
        alice_rx.recv().await.unwrap().content,
        "alice has joined the room"
    );
    assert_eq!(alice_rx.recv().await.unwrap().content, "hello");

    assert_eq!(hub.members("r1").await.unwrap().len(), 1);
    assert!(matches!(
        hub.members("nope").await,
        Err(HubError::RoomNotFound(id)) if id == "nope"
    ));

    hub.unregister(alice_key).unwrap();
    assert!(alice_rx.recv().await.is_none());
    assert!(hub.members("r1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_from_removed_connection_is_dropped() {
    let mut hub = Hub::new(&settings());
    let (alice, mut alice_rx) = connect("u1", "alice", "r1");
    let (bob, _bob_rx) = connect("u2", "bob", "r1");
    let bob_key = bob.key.clone();
    hub.register(alice).await;
    hub.register(bob).await;
    drain(&mut alice_rx);

    hub.submit(&bob_key, Message::chat("still here", "r1", "u2", "bob"))
        .await;
    assert_eq!(contents(&drain(&mut alice_rx)), vec!["still here"]);

    hub.unregister(&bob_key).await;
    assert_eq!(contents(&drain(&mut alice_rx)), vec!["bob has left the room"]);

    hub.submit(&bob_key, Message::chat("ghost", "r1", "u2", "bob"))
        .await;
    assert!(drain(&mut alice_rx).is_empty());
}

#[tokio::test]
async fn test_full_queue_delays_other_rooms() {
    let hub = Hub::new(&settings()).spawn();
    let (slow, _slow_rx) = connect_with_capacity("u1", "slowpoke", "r1", 1);
    let (other, mut other_rx) = connect("u2", "bob", "r2");

    // slowpoke's join notice fills its queue
    hub.register(slow).unwrap();
    hub.register(other).unwrap();
    assert_eq!(other_rx.recv().await.unwrap().content, "bob has joined the room");

    let start = tokio::time::Instant::now();
    hub.broadcast(Message::chat("stuck", "r1", "u9", "zed"))
        .unwrap();
    hub.broadcast(Message::chat("elsewhere", "r2", "u2", "bob"))
        .unwrap();

    assert_eq!(other_rx.recv().await.unwrap().content, "elsewhere");
    assert!(start.elapsed() >= std::time::Duration::from_millis(20));
    assert!(hub.members("r1").await.unwrap().is_empty());
}
