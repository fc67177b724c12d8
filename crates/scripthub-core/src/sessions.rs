//! In-memory registry for hub-issued collaboration sessions.
//!
//! The session endpoints (`/session/create`, `/session/join`,
//! `/session/:id/status`) mint and look up session records here. A session is
//! bookkeeping only; the authoritative participant count always comes from the
//! live room membership.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::prelude::*;
use scripthub_types::types::Role;

#[derive(Clone, Debug)]
pub struct SessionInfo {
	pub session_id: Box<str>,
	pub project_id: Box<str>,
	pub created_by: Box<str>,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
	sessions: RwLock<HashMap<Box<str>, SessionInfo>>,
}

impl SessionRegistry {
	pub fn new() -> Self {
		Self { sessions: RwLock::new(HashMap::new()) }
	}

	/// Mint a new session for a project. The identifier embeds the project
	/// and the creation time in epoch milliseconds.
	pub fn create(&self, project_id: &str, user_id: &str) -> SessionInfo {
		let session_id = format!("session_{}_{}", project_id, Timestamp::now_millis());
		let info = SessionInfo {
			session_id: session_id.into(),
			project_id: project_id.into(),
			created_by: user_id.into(),
			created_at: Utc::now(),
		};

		let mut sessions = self.sessions.write();
		sessions.insert(info.session_id.clone(), info.clone());
		debug!("Session created: {} (project {})", info.session_id, project_id);
		info
	}

	pub fn get(&self, session_id: &str) -> Option<SessionInfo> {
		self.sessions.read().get(session_id).cloned()
	}

	/// Record a join. Returns the session and the effective role
	/// (defaults to `view` when the caller did not request one).
	pub fn join(
		&self,
		session_id: &str,
		user_id: &str,
		role: Option<Role>,
	) -> HubResult<(SessionInfo, Role)> {
		let info = self.get(session_id).ok_or(Error::NotFound)?;
		let role = role.unwrap_or_default();
		debug!("Session join: {} by {} as {}", session_id, user_id, role);
		Ok((info, role))
	}
}


// vim: ts=4
