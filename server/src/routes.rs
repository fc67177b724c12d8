//! API routes

use axum::{
	Router,
	http::{HeaderValue, header},
	routing::{any, get, post},
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};

use crate::prelude::*;
use crate::script_sync;
use crate::session;
use crate::websocket;

async fn api_not_found() -> Error {
	Error::NotFound
}

/// CORS restricted to the configured studio origin; a `*` origin falls back
/// to the permissive layer for local development setups
fn cors_layer(app: &App) -> CorsLayer {
	let origin = app.opts.cors_origin.as_ref();
	match origin.parse::<HeaderValue>() {
		Ok(value) if origin != "*" => CorsLayer::new()
			.allow_origin(value)
			.allow_methods(tower_http::cors::Any)
			.allow_headers(tower_http::cors::Any),
		_ => CorsLayer::very_permissive(),
	}
}

pub fn init(app: App) -> Router {
	// --- WebSocket endpoints ---
	// A missing room segment maps to the room named "default"
	let ws_router = Router::new()
		.route("/ws", any(websocket::get_ws_default))
		.route("/ws/{room}", any(websocket::get_ws_room));

	// --- HTTP API ---
	let api_router = Router::new()
		.route("/health", get(session::get_health))
		.route("/session/create", post(session::post_session_create))
		.route("/session/join", post(session::post_session_join))
		.route("/session/{session_id}/status", get(session::get_session_status))
		.route("/api/mcp/sync-script", post(script_sync::post_sync_script))
		.layer(SetResponseHeaderLayer::if_not_present(
			header::CACHE_CONTROL,
			HeaderValue::from_static("no-store, no-cache"),
		));

	let cors = cors_layer(&app);
	Router::new()
		.merge(ws_router)
		.merge(api_router)
		.fallback(api_not_found)
		.layer(cors)
		.with_state(app)
}

// vim: ts=4
