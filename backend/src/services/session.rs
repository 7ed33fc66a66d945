//! Login, logout and validation flows on top of the session store.
//!
//! Failure policy: anything that prevents the service from proving a claim
//! is treated as a denial. A login that cannot be persisted returns an
//! error and the issued token is discarded, never handed to the caller.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::models::session::Session;
use crate::repositories::user::UserStore;
use crate::services::session_store::{
    RemoveOutcome, SessionStore, SessionStoreError, StoreOutcome,
};
use crate::services::token_issuer::TokenIssuer;
use crate::utils::device::resolve_device_id;
use crate::utils::password::verify_password;

/// Everything a login decision needs, collected by the transport layer.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub username: String,
    pub password: String,
    /// Client-supplied device identifier; fingerprinted from user agent and
    /// address when absent.
    pub device_id: Option<String>,
    pub user_agent: String,
    pub ip_address: String,
}

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub username: String,
}

/// Login failures, worded exactly as they are shown to clients. Credential
/// and existence failures share one message so the response does not leak
/// which usernames exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("User is already logged in on this device")]
    AlreadyLoggedInOnDevice,
    #[error("Failed to create session")]
    SessionCreationFailed,
}

pub struct SessionService {
    users: Arc<dyn UserStore>,
    issuer: Arc<dyn TokenIssuer>,
    store: Arc<dyn SessionStore>,
    session_ttl: Duration,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        issuer: Arc<dyn TokenIssuer>,
        store: Arc<dyn SessionStore>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            issuer,
            store,
            session_ttl,
        }
    }

    /// Runs the full login pipeline: credentials, device exclusivity, token
    /// issuance and persistence. The session token is only returned once
    /// the store has accepted the record.
    pub async fn login(&self, attempt: LoginAttempt) -> Result<LoginSuccess, LoginError> {
        let user = match self.users.find_active_by_username(&attempt.username).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(username = %attempt.username, "login rejected: unknown or inactive user");
                return Err(LoginError::InvalidCredentials);
            }
            Err(err) => {
                tracing::error!(username = %attempt.username, error = ?err, "account lookup failed during login");
                return Err(LoginError::SessionCreationFailed);
            }
        };

        match verify_password(&attempt.password, &user.password_hash) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(user_id = %user.id, "login rejected: password mismatch");
                return Err(LoginError::InvalidCredentials);
            }
            Err(err) => {
                tracing::error!(user_id = %user.id, error = ?err, "password verification failed");
                return Err(LoginError::SessionCreationFailed);
            }
        }

        let device_id = resolve_device_id(
            attempt.device_id.as_deref(),
            &attempt.user_agent,
            &attempt.ip_address,
        );

        match self.store.is_logged_in_on_device(&user.id, &device_id).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::warn!(
                    user_id = %user.id,
                    device_id = %device_id,
                    "login rejected: device already has a live session"
                );
                return Err(LoginError::AlreadyLoggedInOnDevice);
            }
            Err(err) => {
                tracing::error!(user_id = %user.id, error = %err, "device check failed during login");
                return Err(LoginError::SessionCreationFailed);
            }
        }

        let token = match self.issuer.issue(&user) {
            Ok(token) => token,
            Err(err) => {
                tracing::error!(user_id = %user.id, error = ?err, "token issuance failed");
                return Err(LoginError::SessionCreationFailed);
            }
        };
        let refresh_token = self.issuer.issue_refresh();

        let now = Utc::now();
        let expiry_time = now + self.session_ttl;
        let session = Session::new(
            user.id.clone(),
            user.username.clone(),
            token.clone(),
            device_id.clone(),
            attempt.user_agent,
            attempt.ip_address,
            now,
            expiry_time,
        );

        // The store re-checks the device slot with a conditional write, so a
        // login racing past the check above still resolves to one winner.
        match self.store.store(&session).await {
            Ok(StoreOutcome::Stored) => {}
            Ok(StoreOutcome::DeviceConflict) => {
                tracing::warn!(
                    user_id = %user.id,
                    device_id = %device_id,
                    "login lost the device slot to a concurrent session"
                );
                return Err(LoginError::AlreadyLoggedInOnDevice);
            }
            Err(err) => {
                tracing::error!(user_id = %user.id, error = %err, "failed to persist session");
                return Err(LoginError::SessionCreationFailed);
            }
        }

        if let Err(err) = self.users.touch_last_login(&user.id).await {
            tracing::warn!(user_id = %user.id, error = ?err, "failed to record last login time");
        }

        tracing::info!(user_id = %user.id, device_id = %device_id, "user logged in");
        Ok(LoginSuccess {
            token,
            refresh_token,
            expires_at: expiry_time,
            username: user.username,
        })
    }

    /// Removes the session for `token`. Logging out a token that is already
    /// gone is a success from the client's point of view; only a store
    /// failure reports `false`.
    pub async fn logout(&self, token: &str) -> bool {
        match self.store.remove(token).await {
            Ok(RemoveOutcome::Removed) => {
                tracing::info!("session terminated");
                true
            }
            Ok(RemoveOutcome::NotFound) => {
                tracing::debug!("logout for a session that no longer exists");
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to remove session");
                false
            }
        }
    }

    /// Checks that the token verifies, its session record exists and is
    /// still usable, and (when given) that it belongs to `expected_device_id`.
    /// Every rejection is logged; any store failure counts as invalid.
    pub async fn validate_session(&self, token: &str, expected_device_id: Option<&str>) -> bool {
        if !self.issuer.verify(token) {
            tracing::warn!("session validation failed: token did not verify");
            return false;
        }

        let session = match self.store.get(token).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::warn!("session validation failed: no session record");
                return false;
            }
            Err(err) => {
                tracing::error!(error = %err, "session lookup failed during validation");
                return false;
            }
        };

        if !session.is_usable(Utc::now()) {
            tracing::warn!(
                user_id = %session.user_id,
                "session validation failed: session expired or deactivated"
            );
            return false;
        }

        if let Some(expected) = expected_device_id {
            if session.device_id != expected {
                tracing::warn!(
                    user_id = %session.user_id,
                    "session validation failed: device mismatch"
                );
                return false;
            }
        }

        true
    }

    /// Ends every session of the user except those on the current device.
    pub async fn force_logout_other_devices(
        &self,
        user_id: &str,
        current_device_id: &str,
    ) -> Result<usize, SessionStoreError> {
        let removed = self
            .store
            .invalidate_others(user_id, current_device_id)
            .await?;
        tracing::info!(user_id = %user_id, removed, "forced logout on other devices");
        Ok(removed)
    }

    /// Sessions of the user that are still usable right now. Records the
    /// store has not evicted yet but that are past expiry are filtered out.
    pub async fn list_active_sessions(
        &self,
        user_id: &str,
    ) -> Result<Vec<Session>, SessionStoreError> {
        let now = Utc::now();
        let sessions = self.store.list_for_user(user_id).await?;
        Ok(sessions
            .into_iter()
            .filter(|session| session.is_usable(now))
            .collect())
    }

    /// Resolves a bearer token to its live session, for request guards.
    /// Returns `Ok(None)` for anything that should read as "not signed in".
    pub async fn authenticate(&self, token: &str) -> Result<Option<Session>, SessionStoreError> {
        let Some(user_id) = self.issuer.identity_of(token) else {
            return Ok(None);
        };
        let Some(session) = self.store.get(token).await? else {
            return Ok(None);
        };
        if session.user_id != user_id {
            tracing::warn!(
                user_id = %user_id,
                "token identity does not match the stored session"
            );
            return Ok(None);
        }
        if !session.is_usable(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(session))
    }
}
