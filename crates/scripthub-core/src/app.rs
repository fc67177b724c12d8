//! App state type

use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::extensions::Extensions;
use crate::sessions::SessionRegistry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct AppState {
	pub opts: AppBuilderOpts,
	pub auth: TokenVerifier,
	pub sessions: SessionRegistry,

	// Type-erased extension map for feature-specific state
	pub extensions: Extensions,
}

impl AppState {
	/// Get a registered extension by type. Returns error if not found.
	pub fn ext<T: Send + Sync + 'static>(&self) -> scripthub_types::error::HubResult<&T> {
		self.extensions.get::<T>().ok_or_else(|| {
			scripthub_types::error::Error::Internal(format!(
				"Extension {} not registered",
				std::any::type_name::<T>()
			))
		})
	}

	/// Public WebSocket URL for a room, advertised by the session endpoints
	pub fn ws_url(&self, room: &str) -> String {
		format!("ws://{}/ws/{}", self.opts.listen, room)
	}
}

pub type App = Arc<AppState>;

#[derive(Debug)]
pub struct AppBuilderOpts {
	pub listen: Box<str>,
	pub cors_origin: Box<str>,
	pub token_secret: Box<str>,
}

// vim: ts=4
