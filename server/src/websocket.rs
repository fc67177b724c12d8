//! WebSocket upgrade handler
//!
//! Accepts upgrades on `/ws/<room>`; the path segment after `/ws/` is the
//! room name, absent means `default`. The auth token comes from the
//! `Authorization: Bearer` header or the `token` query parameter; a missing
//! or invalid token refuses the upgrade with HTTP 401 before any frame is
//! exchanged.

use std::sync::Arc;

use axum::{
	extract::{Path, Query, State, ws::WebSocketUpgrade},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::prelude::*;
use scripthub_core::auth::extract_token;
use scripthub_crdt::RoomManager;

/// Room name used when the URL carries no room segment
const DEFAULT_ROOM: &str = "default";

/// Query parameters for the WebSocket endpoints
#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
	/// Auth token; the `Authorization` header takes precedence
	pub token: Option<String>,
}

/// `/ws` - room name omitted
pub async fn get_ws_default(
	ws: WebSocketUpgrade,
	Query(query): Query<WsQuery>,
	headers: HeaderMap,
	State(app): State<App>,
) -> Response {
	upgrade(ws, DEFAULT_ROOM.to_string(), &query, &headers, &app)
}

/// `/ws/{room}`
pub async fn get_ws_room(
	ws: WebSocketUpgrade,
	Path(room): Path<String>,
	Query(query): Query<WsQuery>,
	headers: HeaderMap,
	State(app): State<App>,
) -> Response {
	let room = if room.is_empty() { DEFAULT_ROOM.to_string() } else { room };
	upgrade(ws, room, &query, &headers, &app)
}

fn upgrade(
	ws: WebSocketUpgrade,
	room: String,
	query: &WsQuery,
	headers: &HeaderMap,
	app: &App,
) -> Response {
	debug!("WebSocket request for room {}", room);

	let Some(token) = extract_token(headers, query.token.as_deref()) else {
		warn!("WebSocket rejected for room {} - no token", room);
		return (StatusCode::UNAUTHORIZED, "Authentication required").into_response();
	};
	let auth = match app.auth.verify(&token) {
		Ok(auth) => auth,
		Err(e) => {
			warn!("WebSocket rejected for room {} - invalid token: {}", room, e);
			return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
		}
	};

	let manager = match app.ext::<Arc<RoomManager>>() {
		Ok(manager) => Arc::clone(manager),
		Err(e) => return e.into_response(),
	};

	info!("WebSocket accepted: user {} room {} role {}", auth.user_id, room, auth.role);
	ws.on_upgrade(move |socket| {
		scripthub_crdt::handle_room_connection(socket, room, auth, manager)
	})
}

// vim: ts=4
