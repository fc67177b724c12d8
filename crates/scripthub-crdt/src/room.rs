//! Room: one collaborative document and everything attached to it.
//!
//! A room binds a CRDT document, an awareness set, and the connected client
//! sessions for one room name. Document, awareness, and membership mutations
//! are serialized under a single async mutex; no I/O happens under the lock
//! (snapshot bytes are encoded inside, written outside).
//!
//! Persistence is debounced: the store write fires after the configured
//! quiet period following the latest update, with further updates resetting
//! the timer. A failed write logs and is retried on the next update.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::sync::{Mutex, OnceCell, mpsc};
use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, TextRef, Transact, Update};

use crate::awareness::AwarenessSet;
use crate::prelude::*;
use crate::protocol::{Message, SyncMessage};
use scripthub_types::snapshot_adapter::SnapshotAdapter;
use scripthub_types::types::{AuthCtx, Role};

/// Shared text entry every room document carries
const CONTENT_KEY: &str = "content";

/// Transaction origin for snapshot rehydration; never persisted or broadcast
const ORIGIN_SNAPSHOT_LOAD: &str = "snapshot-load";
/// Transaction origin for out-of-band whole-script replacement
const ORIGIN_EXTERNAL_SYNC: &str = "external-sync";

/// An update encoding zero struct changes and zero deletions
fn is_noop_update(update: &[u8]) -> bool {
	matches!(update, [0, 0])
}

#[derive(Clone, Debug)]
pub struct RoomConfig {
	/// Quiet period after the latest update before the snapshot write fires
	pub persist_debounce: std::time::Duration,
	/// How long an empty room stays in memory before eviction
	pub idle_timeout: std::time::Duration,
	/// Ping cadence; a session missing a whole tick is terminated
	pub heartbeat_interval: std::time::Duration,
	/// Awareness entries not refreshed within this window are reaped
	pub awareness_stale_timeout: std::time::Duration,
	/// Bound of the per-session outbound queue; overflow drops the session
	pub send_queue_capacity: usize,
}

impl Default for RoomConfig {
	fn default() -> Self {
		Self {
			persist_debounce: std::time::Duration::from_secs(5),
			idle_timeout: std::time::Duration::from_secs(30),
			heartbeat_interval: std::time::Duration::from_secs(30),
			awareness_stale_timeout: crate::awareness::AWARENESS_STALE_TIMEOUT,
			send_queue_capacity: 256,
		}
	}
}

/// Per-session bookkeeping held by the room. The session's authoritative
/// owner is its connection task; the room only keeps the outbound sender and
/// the awareness client ids observed on this connection.
struct SessionHandle {
	user_id: Box<str>,
	role: Role,
	tx: mpsc::Sender<Vec<u8>>,
	client_ids: HashSet<u64>,
}

struct RoomState {
	doc: Doc,
	content: TextRef,
	awareness: AwarenessSet,
	sessions: HashMap<Uuid, SessionHandle>,
	/// Monotonic counter bumped by every applied script-sync replacement
	version: u64,
	/// Unsaved changes since the last successful snapshot write
	dirty: bool,
	persist_task: Option<tokio::task::JoinHandle<()>>,
	persist_gen: u64,
	/// Bumped on every attach; an eviction timer armed for an older
	/// generation is stale and does nothing
	evict_gen: u64,
	/// Set once the manager has dropped this room; attach must fail so the
	/// caller re-resolves a fresh instance
	evicted: bool,
}

pub struct Room {
	name: Box<str>,
	config: RoomConfig,
	snapshot: Option<Arc<dyn SnapshotAdapter>>,
	state: Mutex<RoomState>,
	loaded: OnceCell<()>,
	/// Back-reference for the persist timer task; rooms are owned by the
	/// manager, never by their own background tasks
	weak_self: Weak<Room>,
}

impl Room {
	pub fn new(
		name: &str,
		config: RoomConfig,
		snapshot: Option<Arc<dyn SnapshotAdapter>>,
	) -> Arc<Room> {
		let doc = Doc::new();
		let content = doc.get_or_insert_text(CONTENT_KEY);
		Arc::new_cyclic(|weak| Room {
			name: name.into(),
			config,
			snapshot,
			state: Mutex::new(RoomState {
				doc,
				content,
				awareness: AwarenessSet::new(),
				sessions: HashMap::new(),
				version: 0,
				dirty: false,
				persist_task: None,
				persist_gen: 0,
				evict_gen: 0,
				evicted: false,
			}),
			loaded: OnceCell::new(),
			weak_self: weak.clone(),
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn config(&self) -> &RoomConfig {
		&self.config
	}

	/// Rehydrate from the snapshot store. Runs at most once per room
	/// instance, even under concurrent first access; failure is logged and
	/// the room continues with an empty document.
	pub async fn ensure_loaded(&self) {
		self.loaded
			.get_or_init(|| async {
				let Some(snapshot) = &self.snapshot else { return };
				match snapshot.load(&self.name).await {
					Ok(Some(bytes)) => {
						let state = self.state.lock().await;
						match Update::decode_v1(&bytes) {
							Ok(update) => {
								let mut txn = state.doc.transact_mut_with(ORIGIN_SNAPSHOT_LOAD);
								match txn.apply_update(update) {
									Ok(()) => info!(
										"Room {} rehydrated from snapshot ({} bytes)",
										self.name,
										bytes.len()
									),
									Err(e) => {
										warn!("Room {} snapshot apply failed: {}", self.name, e);
									}
								}
							}
							Err(e) => {
								warn!("Room {} snapshot decode failed: {}", self.name, e);
							}
						}
					}
					Ok(None) => debug!("Room {}: no snapshot, starting empty", self.name),
					Err(e) => warn!("Room {} snapshot load failed: {}", self.name, e),
				}
			})
			.await;
	}

	/// Add a session. Queues the initial handshake for the new session: a
	/// `syncStep1` carrying the server's state vector, then the awareness
	/// snapshot if any peer state exists.
	pub async fn attach(&self, auth: &AuthCtx) -> HubResult<(Uuid, mpsc::Receiver<Vec<u8>>)> {
		let mut state = self.state.lock().await;
		if state.evicted {
			return Err(Error::ServiceUnavailable("room evicted".into()));
		}
		state.evict_gen += 1;

		let conn_id = Uuid::new_v4();
		let (tx, rx) = mpsc::channel(self.config.send_queue_capacity);

		let sv = state.doc.transact().state_vector().encode_v1();
		let _ = tx.try_send(Message::sync_step1(&sv).encode());
		if !state.awareness.is_empty() {
			let _ = tx.try_send(Message::awareness(&state.awareness.encode_full()).encode());
		}

		state.sessions.insert(
			conn_id,
			SessionHandle {
				user_id: auth.user_id.clone(),
				role: auth.role,
				tx,
				client_ids: HashSet::new(),
			},
		);
		info!(
			"Room {}: session {} attached (user {}, role {}, {} total)",
			self.name,
			conn_id,
			auth.user_id,
			auth.role,
			state.sessions.len()
		);
		Ok((conn_id, rx))
	}

	/// Remove a session and broadcast removal of its awareness entries.
	/// Idempotent (slow-consumer termination may have run first). Returns
	/// the eviction generation to arm a timer for when the room went empty.
	pub async fn detach(&self, conn_id: Uuid) -> Option<u64> {
		let mut state = self.state.lock().await;
		if state.sessions.contains_key(&conn_id) {
			info!("Room {}: session {} detached", self.name, conn_id);
			self.terminate_locked(&mut state, conn_id);
		}
		state.sessions.is_empty().then_some(state.evict_gen)
	}

	/// Dispatch one decoded protocol message from a session
	pub async fn handle_message(&self, conn_id: Uuid, msg: Message) {
		match msg {
			Message::Sync(SyncMessage::Step1(sv_bytes)) => {
				self.handle_sync_step1(conn_id, &sv_bytes).await;
			}
			Message::Sync(SyncMessage::Step2(update)) => {
				self.apply_client_update(conn_id, &update, false).await;
			}
			Message::Sync(SyncMessage::Update(update)) => {
				self.apply_client_update(conn_id, &update, true).await;
			}
			Message::Sync(SyncMessage::Unknown(subtype)) => {
				debug!("Room {}: dropping unknown sync subtype {}", self.name, subtype);
			}
			Message::Awareness(payload) => {
				self.handle_awareness(conn_id, &payload).await;
			}
			Message::Unknown(msg_type) => {
				debug!("Room {}: dropping unknown message type {}", self.name, msg_type);
			}
		}
	}

	/// Answer a state-vector request with the diff the peer is missing.
	/// An empty diff is not sent.
	async fn handle_sync_step1(&self, conn_id: Uuid, sv_bytes: &[u8]) {
		let mut state = self.state.lock().await;
		let sv = match StateVector::decode_v1(sv_bytes) {
			Ok(sv) => sv,
			Err(e) => {
				warn!("Room {}: malformed state vector from {}: {}", self.name, conn_id, e);
				return;
			}
		};
		let diff = state.doc.transact().encode_state_as_update_v1(&sv);
		if is_noop_update(&diff) {
			return;
		}
		let frame = Message::sync_step2(&diff).encode();
		let send_failed = match state.sessions.get(&conn_id) {
			Some(handle) => handle.tx.try_send(frame).is_err(),
			None => return,
		};
		if send_failed {
			warn!("Room {}: dropping unresponsive session {}", self.name, conn_id);
			self.terminate_locked(&mut state, conn_id);
		}
	}

	/// Apply an update from a session; `rebroadcast` fans the frame out to
	/// every other session (syncStep2 responses are applied quietly).
	async fn apply_client_update(&self, conn_id: Uuid, update: &[u8], rebroadcast: bool) {
		let mut state = self.state.lock().await;
		match state.sessions.get(&conn_id) {
			Some(handle) if !handle.role.can_edit() => {
				warn!(
					"Room {}: rejecting document update from view-only session {} (user {})",
					self.name, conn_id, handle.user_id
				);
				return;
			}
			Some(_) => {}
			None => return,
		}

		let decoded = match Update::decode_v1(update) {
			Ok(u) => u,
			Err(e) => {
				warn!("Room {}: malformed update from {}: {}", self.name, conn_id, e);
				return;
			}
		};
		{
			let mut txn = state.doc.transact_mut();
			if let Err(e) = txn.apply_update(decoded) {
				warn!("Room {}: update from {} failed to apply: {}", self.name, conn_id, e);
				return;
			}
		}

		if rebroadcast {
			let frame = Message::sync_update(update).encode();
			self.broadcast_locked(&mut state, &frame, Some(conn_id));
		}
		self.schedule_persist_locked(&mut state);
	}

	/// Merge an awareness delta and relay it to the whole room, originator
	/// included (clients skip their own echo by client id).
	async fn handle_awareness(&self, conn_id: Uuid, payload: &[u8]) {
		let mut state = self.state.lock().await;
		let change = match state.awareness.apply_update(payload, Instant::now()) {
			Ok(change) => change,
			Err(e) => {
				warn!("Room {}: malformed awareness delta from {}: {}", self.name, conn_id, e);
				return;
			}
		};
		if let Some(handle) = state.sessions.get_mut(&conn_id) {
			handle.client_ids.extend(&change.touched);
		}
		if change.is_noop() {
			return;
		}
		let frame = Message::awareness(payload).encode();
		self.broadcast_locked(&mut state, &frame, None);
	}

	/// Reap awareness entries whose owners went silent; driven by the
	/// heartbeat tick.
	pub async fn prune_stale_awareness(&self) {
		let mut state = self.state.lock().await;
		let removal =
			state.awareness.prune_stale(self.config.awareness_stale_timeout, Instant::now());
		if !removal.is_empty() {
			debug!("Room {}: pruned stale awareness entries", self.name);
			let frame = Message::awareness(&removal).encode();
			self.broadcast_locked(&mut state, &frame, None);
		}
	}

	/// Replace the whole `content` text with externally supplied code inside
	/// a single transaction. Returns `None` when the text is already equal
	/// (nothing applied, nothing broadcast), otherwise the bumped room
	/// version. The update is an ordinary (delete, insert) pair, so any
	/// client holding a prefix of the history can apply it.
	pub async fn replace_content(&self, code: &str) -> HubResult<Option<u64>> {
		let mut state = self.state.lock().await;

		let current = state.content.get_string(&state.doc.transact());
		if current == code {
			return Ok(None);
		}

		let update = {
			let mut txn = state.doc.transact_mut_with(ORIGIN_EXTERNAL_SYNC);
			let len = state.content.len(&txn);
			if len > 0 {
				state.content.remove_range(&mut txn, 0, len);
			}
			if !code.is_empty() {
				state.content.insert(&mut txn, 0, code);
			}
			txn.encode_update_v1()
		};

		state.version += 1;
		let version = state.version;
		info!(
			"Room {}: external sync applied ({} -> {} chars, version {})",
			self.name,
			current.len(),
			code.len(),
			version
		);

		let frame = Message::sync_update(&update).encode();
		self.broadcast_locked(&mut state, &frame, None);
		self.schedule_persist_locked(&mut state);
		Ok(Some(version))
	}

	/// Fan a frame out to every attached session except `exclude`. A session
	/// whose queue is full (slow consumer) or closed is terminated on the
	/// spot; the CRDT lets it rejoin and resync without loss.
	fn broadcast_locked(&self, state: &mut RoomState, frame: &[u8], exclude: Option<Uuid>) {
		let mut dropped: Vec<Uuid> = Vec::new();
		for (conn_id, handle) in &state.sessions {
			if Some(*conn_id) == exclude {
				continue;
			}
			if handle.tx.try_send(frame.to_vec()).is_err() {
				dropped.push(*conn_id);
			}
		}
		for conn_id in dropped {
			warn!("Room {}: terminating slow consumer {}", self.name, conn_id);
			self.terminate_locked(state, conn_id);
		}
	}

	/// Drop a session handle and broadcast removal of its awareness entries.
	/// Closing the outbound channel ends the session's send task, which in
	/// turn closes the socket.
	fn terminate_locked(&self, state: &mut RoomState, conn_id: Uuid) {
		let Some(handle) = state.sessions.remove(&conn_id) else { return };
		let client_ids: Vec<u64> = handle.client_ids.into_iter().collect();
		let removal = state.awareness.remove_clients(&client_ids);
		if !removal.is_empty() {
			let frame = Message::awareness(&removal).encode();
			self.broadcast_locked(state, &frame, None);
		}
	}

	/// Arm the debounced snapshot write; every call resets the timer
	fn schedule_persist_locked(&self, state: &mut RoomState) {
		state.dirty = true;
		if self.snapshot.is_none() {
			return;
		}
		state.persist_gen += 1;
		let r#gen = state.persist_gen;
		if let Some(task) = state.persist_task.take() {
			task.abort();
		}
		let Some(room) = self.weak_self.upgrade() else { return };
		state.persist_task = Some(tokio::spawn(async move {
			tokio::time::sleep(room.config.persist_debounce).await;
			room.persist_if_current(r#gen).await;
		}));
	}

	async fn persist_if_current(&self, r#gen: u64) {
		let Some(snapshot) = &self.snapshot else { return };
		let bytes = {
			let mut state = self.state.lock().await;
			if state.persist_gen != r#gen || !state.dirty {
				return;
			}
			state.dirty = false;
			state.doc.transact().encode_state_as_update_v1(&StateVector::default())
		};
		match snapshot.save(&self.name, &bytes).await {
			Ok(()) => debug!("Room {}: snapshot saved ({} bytes)", self.name, bytes.len()),
			Err(e) => {
				// Retried implicitly on the next update
				warn!("Room {}: snapshot save failed: {}", self.name, e);
				self.state.lock().await.dirty = true;
			}
		}
	}

	/// Write out any pending state immediately (eviction, shutdown).
	/// Best effort: a failure here only logs.
	pub async fn flush(&self) {
		let Some(snapshot) = &self.snapshot else { return };
		let bytes = {
			let mut state = self.state.lock().await;
			if let Some(task) = state.persist_task.take() {
				task.abort();
			}
			if !state.dirty {
				return;
			}
			state.dirty = false;
			state.doc.transact().encode_state_as_update_v1(&StateVector::default())
		};
		match snapshot.save(&self.name, &bytes).await {
			Ok(()) => debug!("Room {}: snapshot flushed ({} bytes)", self.name, bytes.len()),
			Err(e) => warn!("Room {}: snapshot flush failed: {}", self.name, e),
		}
	}

	/// Check whether an eviction timer armed for `gen` is still valid, and
	/// if so mark the room dead for late attach attempts.
	pub(crate) async fn begin_eviction(&self, r#gen: u64) -> bool {
		let mut state = self.state.lock().await;
		if !state.sessions.is_empty() || state.evict_gen != r#gen || state.evicted {
			return false;
		}
		state.evicted = true;
		true
	}

	/// Current eviction generation when the room has no sessions (used by
	/// callers that instantiated a room without attaching to it)
	pub async fn idle_generation(&self) -> Option<u64> {
		let state = self.state.lock().await;
		state.sessions.is_empty().then_some(state.evict_gen)
	}

	/// Drop every session handle, ending their send tasks and closing their
	/// sockets. Used on shutdown.
	pub async fn close_all_sessions(&self) {
		let mut state = self.state.lock().await;
		let count = state.sessions.len();
		state.sessions.clear();
		if count > 0 {
			info!("Room {}: closed {} sessions", self.name, count);
		}
	}

	pub async fn participants(&self) -> usize {
		self.state.lock().await.sessions.len()
	}

	pub async fn content(&self) -> String {
		let state = self.state.lock().await;
		let txn = state.doc.transact();
		state.content.get_string(&txn)
	}

	pub async fn version(&self) -> u64 {
		self.state.lock().await.version
	}
}

impl std::fmt::Debug for Room {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Room").field("name", &self.name).finish_non_exhaustive()
	}
}

// vim: ts=4
