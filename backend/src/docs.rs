#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::models::{
    session::{LoginRequest, LoginResponse, SessionResponse},
    user::{RegisterRequest, UserResponse},
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        login_doc,
        logout_doc,
        logout_other_devices_doc,
        validate_session_doc,
        active_sessions_doc,
        register_doc,
        profile_doc
    ),
    components(
        schemas(
            LoginRequest,
            LoginResponse,
            SessionResponse,
            RegisterRequest,
            UserResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Auth", description = "Login, logout and session validation"),
        (name = "Sessions", description = "Active-session visibility and revocation"),
        (name = "Users", description = "Registration and profile")
    ),
    security(("BearerAuth" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        let mut bearer = Http::new(HttpAuthScheme::Bearer);
        bearer.bearer_format = Some("JWT".to_string());

        components.add_security_scheme("BearerAuth", SecurityScheme::Http(bearer));
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login succeeded", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = LoginResponse),
        (status = 409, description = "Device already has a live session", body = LoginResponse)
    ),
    tag = "Auth",
    security(())
)]
fn login_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Session terminated", body = serde_json::Value)),
    tag = "Auth"
)]
fn logout_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/logout-other-devices",
    responses(
        (status = 200, description = "Sessions on other devices terminated", body = serde_json::Value)
    ),
    tag = "Sessions"
)]
fn logout_other_devices_doc() {}

#[utoipa::path(
    get,
    path = "/api/auth/validate-session",
    params(
        ("device_id" = Option<String>, Query, description = "Device the session must belong to")
    ),
    responses(
        (status = 200, description = "Session is valid", body = serde_json::Value),
        (status = 401, description = "Session is invalid or expired", body = serde_json::Value)
    ),
    tag = "Auth"
)]
fn validate_session_doc() {}

#[utoipa::path(
    get,
    path = "/api/auth/active-sessions",
    responses(
        (status = 200, description = "Sessions of the current user", body = [SessionResponse])
    ),
    tag = "Sessions"
)]
fn active_sessions_doc() {}

#[utoipa::path(
    post,
    path = "/api/users/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 409, description = "Username or email already in use")
    ),
    tag = "Users",
    security(())
)]
fn register_doc() {}

#[utoipa::path(
    get,
    path = "/api/users/profile",
    responses(
        (status = 200, description = "Account behind the current session", body = UserResponse)
    ),
    tag = "Users"
)]
fn profile_doc() {}
