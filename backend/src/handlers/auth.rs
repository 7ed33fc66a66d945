use axum::{
    extract::{Extension, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    middleware::auth::BearerToken,
    models::session::{LoginRequest, LoginResponse, Session, SessionResponse},
    services::session::{LoginAttempt, LoginError},
    state::AppState,
    utils::device::{extract_client_ip, extract_user_agent},
};

type HandlerError = (StatusCode, Json<Value>);
type HandlerResult<T> = Result<T, HandlerError>;

/// POST /api/auth/login. Always answers with the login envelope; failures
/// carry `success: false` plus the client-facing message.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> (StatusCode, Json<LoginResponse>) {
    let attempt = LoginAttempt {
        username: payload.username,
        password: payload.password,
        device_id: payload.device_id,
        user_agent: extract_user_agent(&headers),
        ip_address: extract_client_ip(&headers),
    };

    match state.sessions.login(attempt).await {
        Ok(success) => (
            StatusCode::OK,
            Json(LoginResponse {
                success: true,
                token: Some(success.token),
                refresh_token: Some(success.refresh_token),
                expires_at: Some(success.expires_at),
                username: Some(success.username),
                message: "Login successful".to_string(),
            }),
        ),
        Err(err) => {
            let status = match err {
                LoginError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                LoginError::AlreadyLoggedInOnDevice => StatusCode::CONFLICT,
                LoginError::SessionCreationFailed => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(LoginResponse::failure(err.to_string())))
        }
    }
}

/// POST /api/auth/logout. The auth middleware has already resolved the
/// session, so the only failure left is the store refusing the removal.
pub async fn logout(
    State(state): State<AppState>,
    Extension(token): Extension<BearerToken>,
) -> HandlerResult<Json<Value>> {
    if state.sessions.logout(&token.0).await {
        Ok(Json(json!({ "message": "Logged out successfully" })))
    } else {
        Err(internal_error("Failed to terminate session"))
    }
}

/// POST /api/auth/logout-other-devices.
pub async fn logout_other_devices(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> HandlerResult<Json<Value>> {
    let revoked = state
        .sessions
        .force_logout_other_devices(&session.user_id, &session.device_id)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "failed to revoke other-device sessions");
            internal_error("Failed to log out other devices")
        })?;

    Ok(Json(json!({
        "message": "Other sessions terminated",
        "revoked": revoked,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ValidateSessionQuery {
    pub device_id: Option<String>,
}

/// GET /api/auth/validate-session. With `device_id` the session must also
/// belong to that device; the middleware alone does not check this.
pub async fn validate_session(
    State(state): State<AppState>,
    Query(query): Query<ValidateSessionQuery>,
    Extension(token): Extension<BearerToken>,
) -> (StatusCode, Json<Value>) {
    let valid = state
        .sessions
        .validate_session(&token.0, query.device_id.as_deref())
        .await;

    if valid {
        (
            StatusCode::OK,
            Json(json!({ "valid": true, "message": "Session is valid" })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "valid": false, "message": "Session is invalid or expired" })),
        )
    }
}

/// GET /api/auth/active-sessions. Tokens are redacted; the caller's own
/// session is flagged via `current` instead.
pub async fn active_sessions(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(token): Extension<BearerToken>,
) -> HandlerResult<Json<Vec<SessionResponse>>> {
    let sessions = state
        .sessions
        .list_active_sessions(&session.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "failed to list active sessions");
            internal_error("Failed to list active sessions")
        })?;

    let responses = sessions
        .into_iter()
        .map(|entry| SessionResponse::from_session(entry, &token.0))
        .collect();
    Ok(Json(responses))
}

fn handler_error(status: StatusCode, message: &'static str) -> HandlerError {
    (status, Json(json!({ "error": message })))
}

fn internal_error(message: &'static str) -> HandlerError {
    handler_error(StatusCode::INTERNAL_SERVER_ERROR, message)
}
