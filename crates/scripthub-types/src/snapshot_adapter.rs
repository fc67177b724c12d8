//! Snapshot Store Adapter
//!
//! Trait and types for pluggable snapshot backends that durably hold the
//! latest compacted CRDT state for each room, keyed by room name.
//!
//! The hub never inspects snapshot bytes; they are opaque binary produced and
//! consumed by the CRDT library. Adapters wrap them in a small record carrying
//! the save time and payload size, which operational tooling can list without
//! touching the payload.
//!
//! Each adapter implementation provides its own constructor handling
//! backend-specific initialization (directory, credentials, etc.).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::prelude::*;

/// Stored form of a room snapshot: opaque CRDT bytes plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
	/// Base64-encoded CRDT state (full update from the empty state vector)
	pub data: String,

	/// Server time when this snapshot was written (Unix seconds)
	pub saved_at: Timestamp,

	/// Decoded payload size in bytes
	pub size: u64,
}

/// Snapshot Store Adapter trait.
///
/// Unified interface for snapshot backends. All operations are keyed by room
/// name. Save failures are expected to be non-fatal to the hub: the room
/// logs and retries on the next document update.
#[async_trait]
pub trait SnapshotAdapter: Debug + Send + Sync {
	/// Load the latest snapshot bytes for a room.
	///
	/// Returns `Ok(None)` if no snapshot exists (safe to treat as a new
	/// room).
	async fn load(&self, name: &str) -> HubResult<Option<Vec<u8>>>;

	/// Persist the snapshot bytes for a room, replacing any previous one.
	async fn save(&self, name: &str, data: &[u8]) -> HubResult<()>;

	/// Remove the stored snapshot for a room.
	///
	/// Used by operational tooling, not by the hub itself.
	async fn delete(&self, name: &str) -> HubResult<()>;

	/// List the room names that currently have a snapshot.
	///
	/// Used by operational tooling, not by the hub itself.
	async fn list(&self) -> HubResult<Vec<Box<str>>>;
}

// vim: ts=4
