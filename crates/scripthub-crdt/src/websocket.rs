//! WebSocket connection loop for a room session.
//!
//! Each connection runs three tasks: a receive path decoding inbound binary
//! frames and dispatching them to the room, a send path draining the bounded
//! per-session queue (a WebSocket does not admit concurrent writers, so the
//! sink is behind a mutex shared with the heartbeat), and a heartbeat that
//! pings on every tick and terminates the session after a silent one. Text
//! frames are ignored; malformed frames are dropped without closing the
//! connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::sync::Mutex;

use crate::manager::RoomManager;
use crate::prelude::*;
use crate::protocol::MessageReader;
use scripthub_types::types::AuthCtx;

pub async fn handle_room_connection(
	ws: WebSocket,
	room_name: String,
	auth: AuthCtx,
	manager: Arc<RoomManager>,
) {
	info!("CRDT connection: {} / {} (role {})", auth.user_id, room_name, auth.role);

	// Resolve and attach; one retry covers losing a race with room eviction
	let mut attached = None;
	for _ in 0..2 {
		let room = manager.get_or_create(&room_name).await;
		match room.attach(&auth).await {
			Ok((conn_id, rx)) => {
				attached = Some((room, conn_id, rx));
				break;
			}
			Err(e) => debug!("Room {}: attach raced eviction, retrying: {}", room_name, e),
		}
	}
	let Some((room, conn_id, mut rx)) = attached else {
		warn!("Room {}: could not attach session for {}", room_name, auth.user_id);
		return;
	};

	// Split WebSocket for concurrent read/write; the sink is shared between
	// the send task and the heartbeat
	let (ws_tx, mut ws_rx) = ws.split();
	let ws_tx = Arc::new(Mutex::new(ws_tx));
	let alive = Arc::new(AtomicBool::new(true));

	// Send task - serialized writer draining the per-session queue
	let ws_tx_send = ws_tx.clone();
	let mut send_task = tokio::spawn(async move {
		while let Some(frame) = rx.recv().await {
			let mut tx = ws_tx_send.lock().await;
			if tx.send(WsMessage::Binary(frame.into())).await.is_err() {
				return;
			}
		}
		// Queue closed: the room dropped this session (slow consumer or
		// shutdown); close the socket so the client reconnects and resyncs
		let mut tx = ws_tx_send.lock().await;
		let _ = tx.close().await;
	});

	// Receive task - decodes frames and dispatches to the room
	let room_recv = room.clone();
	let alive_recv = alive.clone();
	let mut recv_task = tokio::spawn(async move {
		while let Some(msg) = ws_rx.next().await {
			match msg {
				Ok(WsMessage::Binary(data)) => {
					for decoded in MessageReader::new(&data) {
						match decoded {
							Ok(message) => room_recv.handle_message(conn_id, message).await,
							Err(e) => {
								warn!("Session {}: dropping malformed frame: {}", conn_id, e);
							}
						}
					}
				}
				Ok(WsMessage::Pong(_)) => alive_recv.store(true, Ordering::Relaxed),
				Ok(WsMessage::Close(_)) => break,
				Ok(_) => {} // Text and Ping frames are ignored
				Err(e) => {
					debug!("Session {}: socket error: {}", conn_id, e);
					break;
				}
			}
		}
	});

	// Heartbeat task - ping every tick, terminate after a silent tick; also
	// drives awareness stale-entry reaping for the room
	let ws_tx_heartbeat = ws_tx.clone();
	let alive_heartbeat = alive.clone();
	let room_heartbeat = room.clone();
	let heartbeat_interval = room.config().heartbeat_interval;
	let mut heartbeat_task = tokio::spawn(async move {
		let mut interval = tokio::time::interval(heartbeat_interval);
		interval.tick().await; // first tick completes immediately
		loop {
			interval.tick().await;
			if !alive_heartbeat.swap(false, Ordering::Relaxed) {
				debug!("Session {}: heartbeat timeout", conn_id);
				return;
			}
			{
				let mut tx = ws_tx_heartbeat.lock().await;
				if tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
					return;
				}
			}
			room_heartbeat.prune_stale_awareness().await;
		}
	});

	tokio::select! {
		_ = &mut recv_task => debug!("Session {}: receive path ended", conn_id),
		_ = &mut send_task => debug!("Session {}: send path ended", conn_id),
		_ = &mut heartbeat_task => debug!("Session {}: heartbeat ended", conn_id),
	}
	recv_task.abort();
	send_task.abort();
	heartbeat_task.abort();

	manager.detach(&room, conn_id).await;
	info!("CRDT connection closed: {} / {}", auth.user_id, room_name);
}

// vim: ts=4
