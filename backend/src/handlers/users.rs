use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::session::Session,
    models::user::{RegisterRequest, User, UserResponse},
    state::AppState,
    utils::password::hash_password,
};

/// POST /api/users/register.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    payload.validate()?;

    if state.users.username_exists(&payload.username).await? {
        return Err(AppError::Conflict("Username is already taken".to_string()));
    }
    if state.users.email_exists(&payload.email).await? {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = User::new(payload.username, payload.email, password_hash);
    state.users.insert(&user).await?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// GET /api/users/profile. The account backing an authenticated session can
/// still disappear or be deactivated; that reads as not found.
pub async fn profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .users
        .find_by_id(&session.user_id)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from(user)))
}
