//! Token verification for the hub surface.
//!
//! Two HS256 token flavors share one secret:
//! - identity tokens minted by the identity provider (`sub`, `email`, `exp`)
//! - hub session tokens (`sub`, `sid`, `role`, `exp`, 24 h lifetime)
//!
//! The hub never parses tokens beyond the fields surfaced in [`AuthCtx`].
//! Token issuance endpoints live outside the hub; minting is kept here so the
//! hub flavor stays self-describing.

use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::prelude::*;
use scripthub_types::types::{AuthCtx, Role};

/// Hub-minted session tokens expire after 24 hours
const SESSION_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Claim set covering both accepted token flavors. A present `sid` marks a
/// hub session token; identity-provider tokens carry `sub`/`email` only.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
	sub: String,
	exp: i64,
	#[serde(skip_serializing_if = "Option::is_none")]
	iat: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	email: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	sid: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	role: Option<Role>,
	#[serde(skip_serializing_if = "Option::is_none")]
	jti: Option<String>,
}

pub struct TokenVerifier {
	encoding_key: EncodingKey,
	decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenVerifier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("TokenVerifier")
	}
}

impl TokenVerifier {
	pub fn new(secret: &str) -> Self {
		Self {
			encoding_key: EncodingKey::from_secret(secret.as_bytes()),
			decoding_key: DecodingKey::from_secret(secret.as_bytes()),
		}
	}

	/// Mint a hub session token (24 h, HS256)
	pub fn create_session_token(
		&self,
		user_id: &str,
		session_id: &str,
		role: Role,
	) -> HubResult<String> {
		let now = Timestamp::now();
		let claims = Claims {
			sub: user_id.to_string(),
			exp: now.add_seconds(SESSION_TOKEN_TTL_SECS).0,
			iat: Some(now.0),
			email: None,
			sid: Some(session_id.to_string()),
			role: Some(role),
			jti: None,
		};
		Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
	}

	/// Verify either token flavor, yielding the identity the hub acts on.
	///
	/// Expired, malformed, or badly signed tokens map to `Error::Unauthorized`.
	pub fn verify(&self, token: &str) -> HubResult<AuthCtx> {
		let data = decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))?;
		let claims = data.claims;

		match claims.sid {
			// Hub session token
			Some(sid) => Ok(AuthCtx {
				user_id: claims.sub.into(),
				email: claims.email.map(Into::into),
				session_id: sid.into(),
				role: claims.role.unwrap_or_default(),
			}),
			// Identity-provider token: no session yet, full edit access as
			// the authenticated user
			None => {
				let session_id =
					claims.jti.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
				Ok(AuthCtx {
					user_id: claims.sub.into(),
					email: claims.email.map(Into::into),
					session_id: session_id.into(),
					role: Role::Edit,
				})
			}
		}
	}
}

/// Pull the auth token off an upgrade request: `Authorization: Bearer` wins,
/// then the `token` query parameter.
pub fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
	if let Some(auth_header) = headers.get(header::AUTHORIZATION).and_then(|h| h.to_str().ok()) {
		if let Some(token) = auth_header.strip_prefix("Bearer ") {
			return Some(token.trim().to_string());
		}
	}
	query_token.map(|t| t.to_string())
}


// vim: ts=4
