#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use chrono::{Duration, Utc};

use sessiongate_backend::{
    config::Config,
    error::AppError,
    handlers, middleware,
    models::user::User,
    repositories::user::UserStore,
    services::{
        memory_store::MemorySessionStore, session::SessionService, token_issuer::JwtTokenIssuer,
    },
    state::AppState,
    utils::password::hash_password,
};

pub const TEST_SECRET: &str = "a_secure_token_that_is_long_enough_123";

/// User store backed by process memory so the suites run without Postgres.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, user: User) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_active_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|user| user.username == username && user.is_active)
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn insert(&self, user: &User) -> Result<(), AppError> {
        self.users
            .lock()
            .unwrap()
            .insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .any(|user| user.username == username))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .any(|user| user.email == email))
    }

    async fn touch_last_login(&self, id: &str) -> Result<(), AppError> {
        if let Some(user) = self.users.lock().unwrap().get_mut(id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".into(),
        redis_url: None,
        redis_pool_size: 10,
        redis_connect_timeout: 5,
        jwt_secret: TEST_SECRET.into(),
        session_ttl_minutes: 60,
        session_key_prefix: "test:".into(),
        bind_addr: "127.0.0.1:0".into(),
        cors_allow_origins: vec!["*".into()],
    }
}

pub fn user_with_password(username: &str, email: &str, password: &str) -> User {
    User::new(
        username.to_string(),
        email.to_string(),
        hash_password(password).expect("hash password"),
    )
}

pub struct TestEnv {
    pub state: AppState,
    pub users: Arc<InMemoryUserStore>,
    pub store: Arc<MemorySessionStore>,
}

pub fn test_env() -> TestEnv {
    test_env_with_ttl(Duration::minutes(60))
}

/// Wires the service exactly like the server binary, with the session
/// lifetime under test control.
pub fn test_env_with_ttl(ttl: Duration) -> TestEnv {
    let config = test_config();
    let users = Arc::new(InMemoryUserStore::new());
    let store = Arc::new(MemorySessionStore::new());
    let issuer = Arc::new(JwtTokenIssuer::new(config.jwt_secret.clone(), 60));
    let sessions = Arc::new(SessionService::new(
        users.clone(),
        issuer,
        store.clone(),
        ttl,
    ));
    let state = AppState::new(users.clone(), sessions, config);
    TestEnv {
        state,
        users,
        store,
    }
}

/// Same route table as the server binary.
pub fn app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/users/register", post(handlers::users::register));

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/auth/logout-other-devices",
            post(handlers::auth::logout_other_devices),
        )
        .route(
            "/api/auth/validate-session",
            get(handlers::auth::validate_session),
        )
        .route(
            "/api/auth/active-sessions",
            get(handlers::auth::active_sessions),
        )
        .route("/api/users/profile", get(handlers::users::profile))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
