//! Health and session endpoints.
//!
//! Sessions minted here are bookkeeping records pointing clients at the
//! right WebSocket URL; the live participant count always comes from the
//! room manager.

use std::sync::Arc;

use axum::{
	Json,
	extract::{Path, State},
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::prelude::*;
use scripthub_core::app::VERSION;
use scripthub_crdt::RoomManager;
use scripthub_types::types::Role;

fn now_rfc3339() -> String {
	Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn require_field(value: Option<String>, name: &str) -> HubResult<String> {
	value
		.filter(|v| !v.is_empty())
		.ok_or_else(|| Error::ValidationError(format!("{} is required", name)))
}

// # Health //
//**********//
#[derive(Serialize)]
pub struct Health {
	status: &'static str,
	timestamp: String,
	version: &'static str,
}

pub async fn get_health() -> Json<Health> {
	Json(Health { status: "healthy", timestamp: now_rfc3339(), version: VERSION })
}

// # Session create //
//******************//
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionReq {
	pub project_id: Option<String>,
	pub user_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRes {
	session_id: Box<str>,
	ws_url: String,
	project_id: Box<str>,
	created_at: String,
}

pub async fn post_session_create(
	State(app): State<App>,
	Json(req): Json<CreateSessionReq>,
) -> HubResult<Json<CreateSessionRes>> {
	let project_id = require_field(req.project_id, "projectId")?;
	let user_id = require_field(req.user_id, "userId")?;

	let info = app.sessions.create(&project_id, &user_id);
	Ok(Json(CreateSessionRes {
		ws_url: app.ws_url(&info.project_id),
		session_id: info.session_id,
		project_id: info.project_id,
		created_at: info.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
	}))
}

// # Session join //
//****************//
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionReq {
	pub session_id: Option<String>,
	pub user_id: Option<String>,
	pub role: Option<Role>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionRes {
	session_id: Box<str>,
	ws_url: String,
	role: Role,
	joined_at: String,
}

pub async fn post_session_join(
	State(app): State<App>,
	Json(req): Json<JoinSessionReq>,
) -> HubResult<Json<JoinSessionRes>> {
	let session_id = require_field(req.session_id, "sessionId")?;
	let user_id = require_field(req.user_id, "userId")?;

	let (info, role) = app.sessions.join(&session_id, &user_id, req.role)?;
	Ok(Json(JoinSessionRes {
		ws_url: app.ws_url(&info.project_id),
		session_id: info.session_id,
		role,
		joined_at: now_rfc3339(),
	}))
}

// # Session status //
//******************//
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusRes {
	session_id: Box<str>,
	status: &'static str,
	participants: usize,
	created_at: String,
}

pub async fn get_session_status(
	State(app): State<App>,
	Path(session_id): Path<String>,
) -> HubResult<Json<SessionStatusRes>> {
	let info = app.sessions.get(&session_id).ok_or(Error::NotFound)?;
	let manager = app.ext::<Arc<RoomManager>>()?;
	let participants = manager.participants(&info.project_id).await;

	Ok(Json(SessionStatusRes {
		session_id: info.session_id,
		status: "active",
		participants,
		created_at: info.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
	}))
}

// vim: ts=4
