//! Room manager: the process-wide name → room map.
//!
//! Rooms are created lazily on first access and rehydrated from the snapshot
//! store exactly once, concurrent callers included. When a room's last
//! session detaches, an idle timer is armed; re-attachment before it fires
//! cancels eviction. Eviction flushes pending persistence and drops the
//! room, so the next access recreates it from the snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::prelude::*;
use crate::room::{Room, RoomConfig};
use scripthub_types::snapshot_adapter::SnapshotAdapter;

pub struct RoomManager {
	config: RoomConfig,
	snapshot: Option<Arc<dyn SnapshotAdapter>>,
	rooms: RwLock<HashMap<Box<str>, Arc<Room>>>,
	/// Back-reference for eviction timer tasks
	weak_self: Weak<RoomManager>,
}

impl RoomManager {
	pub fn new(config: RoomConfig, snapshot: Option<Arc<dyn SnapshotAdapter>>) -> Arc<Self> {
		if snapshot.is_none() {
			warn!("No snapshot store configured - room persistence is disabled");
		}
		Arc::new_cyclic(|weak| Self {
			config,
			snapshot,
			rooms: RwLock::new(HashMap::new()),
			weak_self: weak.clone(),
		})
	}

	/// Resolve a room, creating and rehydrating it on first access.
	/// Concurrent callers for the same name get the same instance, and the
	/// snapshot load runs exactly once.
	pub async fn get_or_create(&self, name: &str) -> Arc<Room> {
		let room = {
			let rooms = self.rooms.read().await;
			rooms.get(name).cloned()
		};
		let room = match room {
			Some(room) => room,
			None => {
				let mut rooms = self.rooms.write().await;
				rooms
					.entry(Box::from(name))
					.or_insert_with(|| {
						debug!("Creating room {}", name);
						Room::new(name, self.config.clone(), self.snapshot.clone())
					})
					.clone()
			}
		};
		room.ensure_loaded().await;
		room
	}

	pub async fn get(&self, name: &str) -> Option<Arc<Room>> {
		self.rooms.read().await.get(name).cloned()
	}

	/// Live WebSocket sessions in a room (0 when the room is not in memory)
	pub async fn participants(&self, name: &str) -> usize {
		match self.get(name).await {
			Some(room) => room.participants().await,
			None => 0,
		}
	}

	pub async fn room_count(&self) -> usize {
		self.rooms.read().await.len()
	}

	/// Detach a session from its room and arm the idle timer when it was
	/// the last one.
	pub async fn detach(&self, room: &Arc<Room>, conn_id: Uuid) {
		if let Some(r#gen) = room.detach(conn_id).await {
			self.schedule_eviction(room, r#gen);
		}
	}

	/// Arm the idle-eviction timer for an empty room. The generation makes
	/// the timer a no-op if any session attaches before it fires.
	pub fn schedule_eviction(&self, room: &Arc<Room>, r#gen: u64) {
		let Some(manager) = self.weak_self.upgrade() else { return };
		let room = Arc::clone(room);
		debug!("Room {}: idle, eviction in {:?}", room.name(), room.config().idle_timeout);
		tokio::spawn(async move {
			tokio::time::sleep(room.config().idle_timeout).await;
			manager.try_evict(&room, r#gen).await;
		});
	}

	async fn try_evict(&self, room: &Arc<Room>, r#gen: u64) {
		if !room.begin_eviction(r#gen).await {
			return;
		}
		{
			let mut rooms = self.rooms.write().await;
			rooms.remove(room.name());
		}
		room.flush().await;
		info!("Room {} evicted after idle timeout", room.name());
	}

	/// Destroy a room immediately: flush pending persistence and drop it.
	/// The next access recreates it from the snapshot store.
	pub async fn destroy(&self, name: &str) {
		let room = {
			let mut rooms = self.rooms.write().await;
			rooms.remove(name)
		};
		if let Some(room) = room {
			room.close_all_sessions().await;
			room.flush().await;
			info!("Room {} destroyed", name);
		}
	}

	/// Graceful shutdown: close every session and flush every room
	pub async fn shutdown(&self) {
		let rooms: Vec<Arc<Room>> = {
			let mut map = self.rooms.write().await;
			map.drain().map(|(_, room)| room).collect()
		};
		info!("Shutting down {} rooms", rooms.len());
		for room in rooms {
			room.close_all_sessions().await;
			room.flush().await;
		}
	}
}

impl std::fmt::Debug for RoomManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RoomManager").finish_non_exhaustive()
	}
}

// vim: ts=4
