//! Common types used throughout the Scripthub platform.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::prelude::*;

// Timestamp //
//***********//
#[derive(Clone, Copy, Debug, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(res.as_secs() as i64)
	}

	/// Current time in milliseconds, used for session identifiers
	pub fn now_millis() -> i64 {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		res.as_millis() as i64
	}

	/// Add seconds to this timestamp
	pub fn add_seconds(&self, seconds: i64) -> Timestamp {
		Timestamp(self.0 + seconds)
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::cmp::PartialEq for Timestamp {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl std::cmp::PartialOrd for Timestamp {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl std::cmp::Eq for Timestamp {}

impl std::cmp::Ord for Timestamp {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.0.cmp(&other.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

// Role //
//******//
/// Access role carried by session tokens. `View` sessions may observe a room
/// and share presence; document writes are rejected at message dispatch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	#[default]
	View,
	Edit,
}

impl Role {
	pub fn can_edit(self) -> bool {
		matches!(self, Role::Edit)
	}
}

impl std::fmt::Display for Role {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Role::View => write!(f, "view"),
			Role::Edit => write!(f, "edit"),
		}
	}
}

impl std::str::FromStr for Role {
	type Err = Error;

	fn from_str(s: &str) -> HubResult<Role> {
		match s {
			"view" => Ok(Role::View),
			"edit" => Ok(Role::Edit),
			_ => Err(Error::ValidationError(format!("unknown role: {}", s))),
		}
	}
}

// AuthCtx //
//*********//
/// Verified identity attached to a WebSocket session or a trusted HTTP call.
#[derive(Clone, Debug)]
pub struct AuthCtx {
	pub user_id: Box<str>,
	pub email: Option<Box<str>>,
	pub session_id: Box<str>,
	pub role: Role,
}

// ErrorResponse //
//***************//
/// JSON body returned for every API error
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
	pub code: String,
	pub message: String,
}

impl ErrorResponse {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { error: ErrorBody { code: code.into(), message: message.into() } }
	}
}


// vim: ts=4
