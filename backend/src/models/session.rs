//! Models that represent login sessions and the auth API payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single authenticated login on one device.
///
/// Serialized as JSON into the session store; the `token` field doubles as
/// the primary lookup key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    /// Bearer token issued at login. Never exposed through listing APIs.
    pub token: String,
    /// Explicit client-supplied id, or the request fingerprint.
    pub device_id: String,
    pub user_agent: String,
    pub ip_address: String,
    pub login_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    pub is_active: bool,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: String,
        username: String,
        token: String,
        device_id: String,
        user_agent: String,
        ip_address: String,
        login_time: DateTime<Utc>,
        expiry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            username,
            token,
            device_id,
            user_agent,
            ip_address,
            login_time,
            expiry_time,
            is_active: true,
        }
    }

    /// A session counts only while it is flagged active and not yet expired.
    /// Store TTLs evict records eventually; this check is what the contract
    /// relies on.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expiry_time
    }
}

#[derive(Debug, Deserialize, ToSchema)]
/// Credentials submitted by a user attempting to authenticate.
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Optional stable device id; when absent the server derives a
    /// fingerprint from the request headers.
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Result envelope returned by the login endpoint on success and failure.
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub message: String,
}

impl LoginResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            token: None,
            refresh_token: None,
            expires_at: None,
            username: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// One active session as shown to its owner. Every public field of the
/// session rides along; the bearer token never does.
pub struct SessionResponse {
    pub user_id: String,
    pub username: String,
    pub device_id: String,
    pub user_agent: String,
    pub ip_address: String,
    pub login_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    pub is_active: bool,
    /// Marks the session the caller used to make this request.
    pub current: bool,
}

impl SessionResponse {
    pub fn from_session(session: Session, current_token: &str) -> Self {
        let current = session.token == current_token;
        Self {
            user_id: session.user_id,
            username: session.username,
            device_id: session.device_id,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            login_time: session.login_time,
            expiry_time: session.expiry_time,
            is_active: session.is_active,
            current,
        }
    }
}
