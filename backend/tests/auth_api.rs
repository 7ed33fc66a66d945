//! HTTP-level tests over the full router, auth middleware included.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

mod support;

use support::{app, test_env, user_with_password};

const PASSWORD: &str = "Al1ce@secret";

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("user-agent", "TestAgent/1.0");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn login(app: &Router, username: &str, password: &str, device_id: &str) -> (StatusCode, Value) {
    request(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({
            "username": username,
            "password": password,
            "device_id": device_id,
        })),
    )
    .await
}

fn token_of(body: &Value) -> String {
    body["token"].as_str().expect("token in body").to_string()
}

#[tokio::test]
async fn login_returns_the_session_envelope() {
    let env = test_env();
    env.users
        .seed(user_with_password("alice", "alice@example.com", PASSWORD));
    let app = app(env.state);

    let (status, body) = login(&app, "alice", PASSWORD, "phoneA").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["username"], "alice");
    assert!(body["token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert!(body["expires_at"].is_string());
}

#[tokio::test]
async fn bad_credentials_answer_401_with_a_neutral_message() {
    let env = test_env();
    env.users
        .seed(user_with_password("alice", "alice@example.com", PASSWORD));
    let app = app(env.state);

    let (status, body) = login(&app, "alice", "Wrong@pass1", "phoneA").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid username or password");
    assert!(body.get("token").is_none());

    let (status, body) = login(&app, "nobody", PASSWORD, "phoneA").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid username or password");
}

#[tokio::test]
async fn duplicate_device_login_answers_409() {
    let env = test_env();
    env.users
        .seed(user_with_password("alice", "alice@example.com", PASSWORD));
    let app = app(env.state);

    let (status, _) = login(&app, "alice", PASSWORD, "phoneA").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = login(&app, "alice", PASSWORD, "phoneA").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "User is already logged in on this device");
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let env = test_env();
    let app = app(env.state);

    let (status, _) = request(&app, "GET", "/api/auth/active-sessions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(
        &app,
        "GET",
        "/api/auth/active-sessions",
        Some("not-a-real-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn validate_session_checks_the_requested_device() {
    let env = test_env();
    env.users
        .seed(user_with_password("alice", "alice@example.com", PASSWORD));
    let app = app(env.state);

    let (_, body) = login(&app, "alice", PASSWORD, "phoneA").await;
    let token = token_of(&body);

    let (status, body) = request(
        &app,
        "GET",
        "/api/auth/validate-session?device_id=phoneA",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    let (status, body) = request(
        &app,
        "GET",
        "/api/auth/validate-session?device_id=laptopB",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["valid"], false);

    // Without a device the token's own session is enough.
    let (status, _) = request(&app, "GET", "/api/auth/validate-session", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn active_sessions_redact_tokens_and_flag_the_caller() {
    let env = test_env();
    env.users
        .seed(user_with_password("alice", "alice@example.com", PASSWORD));
    let app = app(env.state);

    let (_, phone_body) = login(&app, "alice", PASSWORD, "phoneA").await;
    let (_, _laptop_body) = login(&app, "alice", PASSWORD, "laptopB").await;
    let phone_token = token_of(&phone_body);

    let (status, body) = request(
        &app,
        "GET",
        "/api/auth/active-sessions",
        Some(&phone_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let sessions = body.as_array().expect("array of sessions");
    assert_eq!(sessions.len(), 2);
    for entry in sessions {
        assert!(entry.get("token").is_none());
        assert!(entry["user_id"].is_string());
        assert_eq!(entry["username"], "alice");
        assert_eq!(entry["is_active"], true);
        let current = entry["current"].as_bool().unwrap();
        let device_id = entry["device_id"].as_str().unwrap();
        assert_eq!(current, device_id == "phoneA");
    }
}

#[tokio::test]
async fn logout_invalidates_the_presented_token() {
    let env = test_env();
    env.users
        .seed(user_with_password("alice", "alice@example.com", PASSWORD));
    let app = app(env.state);

    let (_, body) = login(&app, "alice", PASSWORD, "phoneA").await;
    let token = token_of(&body);

    let (status, body) = request(&app, "POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");

    // The middleware now rejects the token outright.
    let (status, _) = request(&app, "GET", "/api/auth/validate-session", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // And the device accepts a fresh login.
    let (status, _) = login(&app, "alice", PASSWORD, "phoneA").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn logout_other_devices_revokes_everything_else() {
    let env = test_env();
    env.users
        .seed(user_with_password("alice", "alice@example.com", PASSWORD));
    let app = app(env.state);

    let (_, phone_body) = login(&app, "alice", PASSWORD, "phoneA").await;
    let (_, laptop_body) = login(&app, "alice", PASSWORD, "laptopB").await;
    let phone_token = token_of(&phone_body);
    let laptop_token = token_of(&laptop_body);

    let (status, body) = request(
        &app,
        "POST",
        "/api/auth/logout-other-devices",
        Some(&phone_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 1);

    let (status, _) = request(
        &app,
        "GET",
        "/api/auth/validate-session",
        Some(&laptop_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(
        &app,
        "GET",
        "/api/auth/validate-session",
        Some(&phone_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn register_creates_an_account_that_can_log_in() {
    let env = test_env();
    let app = app(env.state);

    let (status, body) = request(
        &app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({
            "username": "bob",
            "email": "bob@example.com",
            "password": "B0b@secret!",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "bob");
    assert_eq!(body["email"], "bob@example.com");
    assert_eq!(body["is_active"], true);
    assert!(body.get("password_hash").is_none());

    let (status, _) = login(&app, "bob", "B0b@secret!", "phoneA").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn register_rejects_duplicates_and_bad_payloads() {
    let env = test_env();
    env.users
        .seed(user_with_password("alice", "alice@example.com", PASSWORD));
    let app = app(env.state);

    let (status, body) = request(
        &app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({
            "username": "alice",
            "email": "new@example.com",
            "password": "N3w@secret!",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Username is already taken");

    let (status, body) = request(
        &app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({
            "username": "alice2",
            "email": "alice@example.com",
            "password": "N3w@secret!",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Email is already registered");

    let (status, body) = request(
        &app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({
            "username": "x",
            "email": "not-an-email",
            "password": "short",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn profile_returns_the_account_behind_the_session() {
    let env = test_env();
    env.users
        .seed(user_with_password("alice", "alice@example.com", PASSWORD));
    let app = app(env.state);

    let (_, body) = login(&app, "alice", PASSWORD, "phoneA").await;
    let token = token_of(&body);

    let (status, body) = request(&app, "GET", "/api/users/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");
    assert!(body.get("password_hash").is_none());
}
