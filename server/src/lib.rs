//! Scripthub server: the HTTP/WebSocket surface of the collaboration hub.
//!
//! Wires the room manager, token verifier, and snapshot adapter into an
//! axum application. Binaries configure a [`Builder`] (see `basic-server`)
//! and call [`Builder::run`], which serves until SIGINT and then flushes
//! every room.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod prelude;
pub mod routes;
pub mod script_sync;
pub mod session;
pub mod websocket;

use std::sync::Arc;

use crate::prelude::*;
use scripthub_core::app::{AppBuilderOpts, AppState};
use scripthub_core::auth::TokenVerifier;
use scripthub_core::extensions::Extensions;
use scripthub_core::sessions::SessionRegistry;
use scripthub_crdt::{RoomConfig, RoomManager};
use scripthub_types::snapshot_adapter::SnapshotAdapter;

pub struct Builder {
	listen: Box<str>,
	cors_origin: Box<str>,
	token_secret: Option<Box<str>>,
	room_config: RoomConfig,
	snapshot_adapter: Option<Arc<dyn SnapshotAdapter>>,
}

impl Builder {
	pub fn new() -> Self {
		Builder {
			listen: "0.0.0.0:4000".into(),
			cors_origin: "http://localhost:3000".into(),
			token_secret: None,
			room_config: RoomConfig::default(),
			snapshot_adapter: None,
		}
	}

	// Opts
	pub fn listen(&mut self, listen: impl Into<Box<str>>) -> &mut Self {
		self.listen = listen.into();
		self
	}
	pub fn cors_origin(&mut self, cors_origin: impl Into<Box<str>>) -> &mut Self {
		self.cors_origin = cors_origin.into();
		self
	}
	pub fn token_secret(&mut self, token_secret: impl Into<Box<str>>) -> &mut Self {
		self.token_secret = Some(token_secret.into());
		self
	}
	pub fn room_config(&mut self, room_config: RoomConfig) -> &mut Self {
		self.room_config = room_config;
		self
	}

	// Adapters
	pub fn snapshot_adapter(&mut self, snapshot_adapter: Arc<dyn SnapshotAdapter>) -> &mut Self {
		self.snapshot_adapter = Some(snapshot_adapter);
		self
	}

	/// Assemble the application state without serving (used by tests)
	pub fn build(self) -> HubResult<App> {
		let token_secret = self
			.token_secret
			.ok_or_else(|| Error::ConfigError("token verification secret is not set".into()))?;

		let manager = RoomManager::new(self.room_config, self.snapshot_adapter);
		let mut extensions = Extensions::new();
		extensions.insert(manager);

		Ok(Arc::new(AppState {
			opts: AppBuilderOpts {
				listen: self.listen,
				cors_origin: self.cors_origin,
				token_secret: token_secret.clone(),
			},
			auth: TokenVerifier::new(&token_secret),
			sessions: SessionRegistry::new(),
			extensions,
		}))
	}

	pub async fn run(self) -> HubResult<()> {
		tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.init();

		let app = self.build()?;
		let router = routes::init(app.clone());

		// Bind failure is the only fatal startup error
		let listener = tokio::net::TcpListener::bind(app.opts.listen.as_ref()).await?;
		info!("Scripthub listening on {}", app.opts.listen);

		axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

		// Stop accepting, close sessions, flush pending persistence
		let manager = app.ext::<Arc<RoomManager>>()?;
		manager.shutdown().await;
		info!("Shutdown complete");
		Ok(())
	}
}

impl Default for Builder {
	fn default() -> Self {
		Self::new()
	}
}

async fn shutdown_signal() {
	if tokio::signal::ctrl_c().await.is_err() {
		warn!("Failed to install SIGINT handler, running until killed");
		std::future::pending::<()>().await;
	}
	info!("Shutdown signal received");
}

// vim: ts=4
