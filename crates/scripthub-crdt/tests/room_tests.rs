//! Integration tests for room lifecycle, sync fan-out, awareness relay,
//! script sync, persistence, and eviction.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, Text, TextRef, Transact, Update};

use scripthub_crdt::codec::{Reader, write_var_string, write_var_uint};
use scripthub_crdt::protocol::{Message, MessageReader, SyncMessage};
use scripthub_crdt::{Room, RoomConfig, RoomManager};
use scripthub_snapshot_adapter_fs::SnapshotAdapterFs;
use scripthub_types::snapshot_adapter::SnapshotAdapter;
use scripthub_types::types::{AuthCtx, Role};

fn auth(user: &str, role: Role) -> AuthCtx {
	AuthCtx {
		user_id: user.into(),
		email: None,
		session_id: format!("session_{}_0", user).into(),
		role,
	}
}

fn test_config() -> RoomConfig {
	RoomConfig {
		persist_debounce: Duration::from_millis(50),
		idle_timeout: Duration::from_millis(100),
		heartbeat_interval: Duration::from_secs(30),
		awareness_stale_timeout: Duration::from_secs(30),
		send_queue_capacity: 64,
	}
}

/// A simulated collaborating peer: a client-side doc plus protocol glue
struct TestClient {
	doc: Doc,
	text: TextRef,
}

impl TestClient {
	fn new() -> Self {
		let doc = Doc::new();
		let text = doc.get_or_insert_text("content");
		Self { doc, text }
	}

	fn insert(&self, index: u32, chunk: &str) -> Vec<u8> {
		let mut txn = self.doc.transact_mut();
		self.text.insert(&mut txn, index, chunk);
		txn.encode_update_v1()
	}

	fn state_vector(&self) -> Vec<u8> {
		self.doc.transact().state_vector().encode_v1()
	}

	/// Apply every document update carried by a broadcast frame
	fn apply_frame(&self, frame: &[u8]) {
		for msg in MessageReader::new(frame) {
			match msg.expect("malformed frame") {
				Message::Sync(SyncMessage::Step2(update) | SyncMessage::Update(update)) => {
					let mut txn = self.doc.transact_mut();
					txn.apply_update(Update::decode_v1(&update).expect("bad update"))
						.expect("apply failed");
				}
				_ => {}
			}
		}
	}

	fn content(&self) -> String {
		self.text.get_string(&self.doc.transact())
	}
}

fn drain(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<Vec<u8>> {
	let mut frames = Vec::new();
	while let Ok(frame) = rx.try_recv() {
		frames.push(frame);
	}
	frames
}

fn count_update_frames(frames: &[Vec<u8>]) -> usize {
	frames
		.iter()
		.flat_map(|f| MessageReader::new(f))
		.filter(|m| matches!(m, Ok(Message::Sync(SyncMessage::Update(_)))))
		.count()
}

fn awareness_delta(client: u64, clock: u64, json: &str) -> Vec<u8> {
	let mut buf = Vec::new();
	write_var_uint(&mut buf, 1);
	write_var_uint(&mut buf, client);
	write_var_uint(&mut buf, clock);
	write_var_string(&mut buf, json);
	buf
}

async fn attach(room: &Arc<Room>, user: &str, role: Role) -> (Uuid, mpsc::Receiver<Vec<u8>>) {
	room.attach(&auth(user, role)).await.expect("attach failed")
}

#[tokio::test]
async fn test_initial_handshake_is_step1() {
	let room = Room::new("roomA", test_config(), None);
	let (_conn, mut rx) = attach(&room, "alice", Role::Edit).await;

	let frames = drain(&mut rx);
	assert_eq!(frames.len(), 1, "empty room sends only syncStep1");
	let mut reader = MessageReader::new(&frames[0]);
	assert!(matches!(
		reader.next(),
		Some(Ok(Message::Sync(SyncMessage::Step1(_))))
	));
}

#[tokio::test]
async fn test_two_client_convergence() {
	let room = Room::new("roomA", test_config(), None);
	let (conn1, mut rx1) = attach(&room, "alice", Role::Edit).await;
	let (conn2, mut rx2) = attach(&room, "bob", Role::Edit).await;
	drain(&mut rx1);
	drain(&mut rx2);

	let client1 = TestClient::new();
	let client2 = TestClient::new();

	// Concurrent edits: both created against the empty document
	let u1 = client1.insert(0, "hello ");
	let u2 = client2.insert(0, "world");

	room.handle_message(conn1, Message::sync_update(&u1)).await;
	room.handle_message(conn2, Message::sync_update(&u2)).await;

	let frames1 = drain(&mut rx1);
	let frames2 = drain(&mut rx2);

	// No echo: each session sees only the other's update
	assert_eq!(count_update_frames(&frames1), 1);
	assert_eq!(count_update_frames(&frames2), 1);

	for frame in &frames1 {
		client1.apply_frame(frame);
	}
	for frame in &frames2 {
		client2.apply_frame(frame);
	}

	assert_eq!(client1.content(), client2.content());
	assert_eq!(client1.content().len(), 11);
	assert_eq!(room.content().await, client1.content());
}

#[tokio::test]
async fn test_duplicate_update_is_idempotent() {
	let room = Room::new("roomA", test_config(), None);
	let (conn1, _rx1) = attach(&room, "alice", Role::Edit).await;

	let client = TestClient::new();
	let update = client.insert(0, "abc");

	room.handle_message(conn1, Message::sync_update(&update)).await;
	let after_first = room.content().await;
	room.handle_message(conn1, Message::sync_update(&update)).await;

	assert_eq!(room.content().await, after_first);
	assert_eq!(after_first, "abc");
}

#[tokio::test]
async fn test_step1_reply_and_empty_diff_suppression() {
	let room = Room::new("roomA", test_config(), None);
	room.replace_content("abc").await.expect("seed failed");

	let (conn1, mut rx1) = attach(&room, "alice", Role::Edit).await;
	drain(&mut rx1);

	let client = TestClient::new();
	room.handle_message(conn1, Message::sync_step1(&client.state_vector())).await;

	let frames = drain(&mut rx1);
	assert_eq!(frames.len(), 1);
	let mut reader = MessageReader::new(&frames[0]);
	let Some(Ok(Message::Sync(SyncMessage::Step2(update)))) = reader.next() else {
		panic!("expected syncStep2 reply");
	};
	{
		let mut txn = client.doc.transact_mut();
		txn.apply_update(Update::decode_v1(&update).expect("bad update")).expect("apply");
	}
	assert_eq!(client.content(), "abc");

	// Fully synced peer asks again: the empty diff is not sent
	room.handle_message(conn1, Message::sync_step1(&client.state_vector())).await;
	assert!(drain(&mut rx1).is_empty());
}

#[tokio::test]
async fn test_view_role_cannot_write() {
	let room = Room::new("roomA", test_config(), None);
	let (viewer, _rx_viewer) = attach(&room, "eve", Role::View).await;
	let (_editor, mut rx_editor) = attach(&room, "alice", Role::Edit).await;
	drain(&mut rx_editor);

	let client = TestClient::new();
	let update = client.insert(0, "sneaky");
	room.handle_message(viewer, Message::sync_update(&update)).await;

	assert_eq!(room.content().await, "");
	assert_eq!(count_update_frames(&drain(&mut rx_editor)), 0);

	// Read path still works for viewers
	room.handle_message(viewer, Message::sync_step1(&client.state_vector())).await;
}

#[tokio::test]
async fn test_awareness_relay_and_snapshot() {
	let room = Room::new("roomA", test_config(), None);
	let (conn1, mut rx1) = attach(&room, "alice", Role::Edit).await;
	let (_conn2, mut rx2) = attach(&room, "bob", Role::Edit).await;
	drain(&mut rx1);
	drain(&mut rx2);

	let delta = awareness_delta(7, 1, r#"{"name":"A","cursor":{"line":3,"col":5}}"#);
	room.handle_message(conn1, Message::awareness(&delta)).await;

	// Broadcast includes the originator; clients drop their own echo by id
	let frames1 = drain(&mut rx1);
	let frames2 = drain(&mut rx2);
	assert!(matches!(
		MessageReader::new(&frames1[0]).next(),
		Some(Ok(Message::Awareness(_)))
	));
	assert_eq!(frames1.len(), 1);
	assert_eq!(frames2.len(), 1);

	// A late joiner gets the current awareness snapshot after syncStep1
	let (_conn3, mut rx3) = attach(&room, "carol", Role::Edit).await;
	let frames3 = drain(&mut rx3);
	assert_eq!(frames3.len(), 2);
	assert!(matches!(
		MessageReader::new(&frames3[1]).next(),
		Some(Ok(Message::Awareness(_)))
	));
}

#[tokio::test]
async fn test_awareness_removed_on_detach() {
	let room = Room::new("roomA", test_config(), None);
	let (conn1, _rx1) = attach(&room, "alice", Role::Edit).await;
	let (_conn2, mut rx2) = attach(&room, "bob", Role::Edit).await;
	drain(&mut rx2);

	room.handle_message(conn1, Message::awareness(&awareness_delta(7, 1, r#"{"name":"A"}"#)))
		.await;
	drain(&mut rx2);

	room.detach(conn1).await;

	let frames = drain(&mut rx2);
	assert_eq!(frames.len(), 1, "peer receives a removal delta");
	let Some(Ok(Message::Awareness(payload))) = MessageReader::new(&frames[0]).next() else {
		panic!("expected awareness frame");
	};

	// Removal is client 7 with a bumped clock and null state
	let mut reader = Reader::new(&payload);
	assert_eq!(reader.read_var_uint(), Ok(1));
	assert_eq!(reader.read_var_uint(), Ok(7));
	assert_eq!(reader.read_var_uint(), Ok(2));
	assert_eq!(reader.read_var_string(), Ok("null"));
}

#[tokio::test]
async fn test_script_sync_replacement() {
	let room = Room::new("roomC", test_config(), None);
	let (conn1, mut rx1) = attach(&room, "alice", Role::Edit).await;
	drain(&mut rx1);

	// Client and server both hold the initial script
	let client = TestClient::new();
	let seed = client.insert(0, "x = 1\n");
	room.handle_message(conn1, Message::sync_update(&seed)).await;

	let version = room.replace_content("x = 2\n").await.expect("sync failed");
	assert_eq!(version, Some(1));

	// The connected client converges through a normal update frame
	for frame in drain(&mut rx1) {
		client.apply_frame(&frame);
	}
	assert_eq!(client.content(), "x = 2\n");

	// Identical replacement: nothing applied, nothing broadcast
	let version = room.replace_content("x = 2\n").await.expect("sync failed");
	assert_eq!(version, None);
	assert!(drain(&mut rx1).is_empty());

	// Version counter is monotonic per applied replacement
	let version = room.replace_content("x = 3\n").await.expect("sync failed");
	assert_eq!(version, Some(2));
	assert_eq!(room.version().await, 2);
}

#[tokio::test]
async fn test_slow_consumer_is_terminated() {
	let mut config = test_config();
	config.send_queue_capacity = 4;
	let room = Room::new("roomA", config, None);

	// Slow consumer: attached but never drained
	let (_slow, mut slow_rx) = attach(&room, "slow", Role::Edit).await;
	let (fast, mut fast_rx) = attach(&room, "fast", Role::Edit).await;
	drain(&mut fast_rx);
	assert_eq!(room.participants().await, 2);

	let client = TestClient::new();
	for i in 0..20 {
		let update = client.insert(0, &format!("edit{} ", i));
		room.handle_message(fast, Message::sync_update(&update)).await;
	}

	assert_eq!(room.participants().await, 1, "slow consumer dropped");

	// The slow session's queue is closed after its buffered frames
	while slow_rx.try_recv().is_ok() {}
	assert!(slow_rx.recv().await.is_none());

	// A rejoin resyncs to the full current state via step1/step2
	let (rejoin, mut rejoin_rx) = attach(&room, "slow", Role::Edit).await;
	drain(&mut rejoin_rx);
	let fresh = TestClient::new();
	room.handle_message(rejoin, Message::sync_step1(&fresh.state_vector())).await;
	for frame in drain(&mut rejoin_rx) {
		fresh.apply_frame(&frame);
	}
	assert_eq!(fresh.content(), room.content().await);
	assert_eq!(fresh.content(), client.content());
}

#[tokio::test]
async fn test_debounced_persistence_and_rehydration() {
	let temp = tempfile::TempDir::new().expect("tempdir");
	let adapter: Arc<dyn SnapshotAdapter> =
		Arc::new(SnapshotAdapterFs::new(temp.path()).await.expect("adapter"));

	{
		let manager = RoomManager::new(test_config(), Some(adapter.clone()));
		let room = manager.get_or_create("roomB").await;
		room.replace_content("abc").await.expect("sync failed");

		// Nothing on disk inside the debounce window
		assert_eq!(adapter.load("roomB").await.expect("load"), None);
		tokio::time::sleep(Duration::from_millis(200)).await;
		assert!(adapter.load("roomB").await.expect("load").is_some());
	}

	// A fresh manager rehydrates the room from the snapshot
	let manager = RoomManager::new(test_config(), Some(adapter.clone()));
	let room = manager.get_or_create("roomB").await;
	assert_eq!(room.content().await, "abc");
}

#[tokio::test]
async fn test_debounce_resets_on_touch() {
	let temp = tempfile::TempDir::new().expect("tempdir");
	let adapter: Arc<dyn SnapshotAdapter> =
		Arc::new(SnapshotAdapterFs::new(temp.path()).await.expect("adapter"));

	let mut config = test_config();
	config.persist_debounce = Duration::from_millis(200);
	let manager = RoomManager::new(config, Some(adapter.clone()));
	let room = manager.get_or_create("roomB").await;

	// Keep touching the room faster than the debounce window
	for i in 0..3 {
		room.replace_content(&format!("v{}", i)).await.expect("sync failed");
		tokio::time::sleep(Duration::from_millis(30)).await;
	}
	assert_eq!(adapter.load("roomB").await.expect("load"), None, "timer kept resetting");

	tokio::time::sleep(Duration::from_millis(400)).await;
	assert!(adapter.load("roomB").await.expect("load").is_some());
}

#[tokio::test]
async fn test_idle_eviction_and_snapshot_recovery() {
	let temp = tempfile::TempDir::new().expect("tempdir");
	let adapter: Arc<dyn SnapshotAdapter> =
		Arc::new(SnapshotAdapterFs::new(temp.path()).await.expect("adapter"));

	let manager = RoomManager::new(test_config(), Some(adapter));
	let room = manager.get_or_create("roomB").await;

	let (conn1, _rx1) = attach(&room, "alice", Role::Edit).await;
	room.replace_content("abc").await.expect("sync failed");

	manager.detach(&room, conn1).await;
	assert_eq!(manager.room_count().await, 1, "eviction is delayed");

	// Idle timer (100ms) fires, flushing pending persistence
	tokio::time::sleep(Duration::from_millis(300)).await;
	assert_eq!(manager.room_count().await, 0, "room evicted");

	// Next attach produces the state of the last snapshot save
	let revived = manager.get_or_create("roomB").await;
	assert!(!Arc::ptr_eq(&room, &revived), "fresh instance after eviction");
	assert_eq!(revived.content().await, "abc");
}

#[tokio::test]
async fn test_reattach_cancels_eviction() {
	let manager = RoomManager::new(test_config(), None);
	let room = manager.get_or_create("roomB").await;

	let (conn1, _rx1) = attach(&room, "alice", Role::Edit).await;
	manager.detach(&room, conn1).await;

	// Re-attach before the 100ms idle timer fires
	tokio::time::sleep(Duration::from_millis(30)).await;
	let (_conn2, _rx2) = attach(&room, "bob", Role::Edit).await;

	tokio::time::sleep(Duration::from_millis(300)).await;
	assert_eq!(manager.room_count().await, 1, "eviction cancelled by re-attach");
	let same = manager.get_or_create("roomB").await;
	assert!(Arc::ptr_eq(&room, &same));
}

#[tokio::test]
async fn test_concurrent_get_or_create_returns_same_room() {
	let manager = RoomManager::new(test_config(), None);
	let (a, b, c) = tokio::join!(
		manager.get_or_create("roomX"),
		manager.get_or_create("roomX"),
		manager.get_or_create("roomX"),
	);
	assert!(Arc::ptr_eq(&a, &b));
	assert!(Arc::ptr_eq(&b, &c));
	assert_eq!(manager.room_count().await, 1);
}

#[tokio::test]
async fn test_destroy_flushes_and_recreates() {
	let temp = tempfile::TempDir::new().expect("tempdir");
	let adapter: Arc<dyn SnapshotAdapter> =
		Arc::new(SnapshotAdapterFs::new(temp.path()).await.expect("adapter"));

	let manager = RoomManager::new(test_config(), Some(adapter.clone()));
	let room = manager.get_or_create("roomB").await;
	room.replace_content("precious").await.expect("sync failed");

	// Destroy before the debounce fires: the flush must still save
	manager.destroy("roomB").await;
	assert!(adapter.load("roomB").await.expect("load").is_some());

	let revived = manager.get_or_create("roomB").await;
	assert_eq!(revived.content().await, "precious");
}

#[tokio::test]
async fn test_malformed_frames_do_not_poison_room() {
	let room = Room::new("roomA", test_config(), None);
	let (conn1, mut rx1) = attach(&room, "alice", Role::Edit).await;
	drain(&mut rx1);

	// Garbage update and garbage state vector are dropped
	room.handle_message(conn1, Message::sync_update(&[0xde, 0xad, 0xbe, 0xef])).await;
	room.handle_message(conn1, Message::sync_step1(&[0xff, 0xff])).await;
	room.handle_message(conn1, Message::awareness(&[0x05])).await;

	// Session still works afterwards
	let client = TestClient::new();
	let update = client.insert(0, "still alive");
	room.handle_message(conn1, Message::sync_update(&update)).await;
	assert_eq!(room.content().await, "still alive");
}
