//! Script sync endpoint.
//!
//! Trusted callers (the studio script regenerator, editor-extension pushes)
//! POST a full-text replacement for a room. The replacement is applied as a
//! (delete, insert) pair inside one CRDT transaction, so connected clients
//! converge through the normal update broadcast instead of a state reset.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::prelude::*;
use scripthub_crdt::RoomManager;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncScriptReq {
	pub project_id: Option<String>,
	pub code: Option<String>,
	/// Optional but verified when present; the endpoint itself sits on a
	/// trusted surface
	pub token: Option<String>,
	pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncScriptRes {
	pub changed: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub version: Option<u64>,
}

pub async fn post_sync_script(
	State(app): State<App>,
	Json(req): Json<SyncScriptReq>,
) -> HubResult<Json<SyncScriptRes>> {
	let project_id = req
		.project_id
		.as_deref()
		.filter(|p| !p.is_empty())
		.ok_or_else(|| Error::ValidationError("projectId is required".into()))?;
	let code =
		req.code.ok_or_else(|| Error::ValidationError("code is required".into()))?;
	if let Some(token) = &req.token {
		app.auth.verify(token)?;
	}

	info!(
		"Script sync for {} ({} chars, source {})",
		project_id,
		code.len(),
		req.source.as_deref().unwrap_or("unknown")
	);

	let manager = app.ext::<Arc<RoomManager>>()?;
	let room = manager.get_or_create(project_id).await;
	let result = room.replace_content(&code).await?;

	// A room instantiated just to host this mutation must not linger; the
	// debounced write still lands before the idle timer fires
	if let Some(r#gen) = room.idle_generation().await {
		manager.schedule_eviction(&room, r#gen);
	}

	match result {
		Some(version) => Ok(Json(SyncScriptRes { changed: true, version: Some(version) })),
		None => Ok(Json(SyncScriptRes { changed: false, version: None })),
	}
}

// vim: ts=4
