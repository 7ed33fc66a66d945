use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use chrono::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use sessiongate_backend::{
    config::Config,
    db::{connection::create_pool, redis::create_redis_pool},
    docs::ApiDoc,
    handlers, middleware,
    repositories::user::PgUserStore,
    services::{
        memory_store::MemorySessionStore,
        session::SessionService,
        session_store::{RedisSessionStore, SessionStore},
        token_issuer::JwtTokenIssuer,
    },
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(24 * 60 * 60));

    if config.cors_allow_origins.iter().any(|origin| origin == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allow_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sessiongate_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        redis_url = %config.redis_url.as_deref().unwrap_or("<none>"),
        jwt_secret = %mask_secret(&config.jwt_secret),
        session_ttl_minutes = config.session_ttl_minutes,
        session_key_prefix = %config.session_key_prefix,
        bind_addr = %config.bind_addr,
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Pick the session backend: Redis when configured, process memory otherwise
    let session_store: Arc<dyn SessionStore> = match create_redis_pool(&config).await? {
        Some(redis_pool) => Arc::new(RedisSessionStore::new(
            redis_pool,
            config.session_key_prefix.clone(),
            config.session_ttl_minutes * 60,
        )),
        None => {
            tracing::warn!(
                "REDIS_URL is not set; sessions are kept in process memory and do not survive restarts"
            );
            Arc::new(MemorySessionStore::new())
        }
    };

    let users = Arc::new(PgUserStore::new(pool));
    let issuer = Arc::new(JwtTokenIssuer::new(
        config.jwt_secret.clone(),
        config.session_ttl_minutes as i64,
    ));
    let sessions = Arc::new(SessionService::new(
        users.clone(),
        issuer,
        session_store,
        Duration::minutes(config.session_ttl_minutes as i64),
    ));
    let state = AppState::new(users, sessions, config.clone());

    // Build public routes (no auth)
    let public_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/users/register", post(handlers::users::register));

    // Build session-protected routes (auth required)
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

    // Compose app with shared layers (request id/Trace/CORS) and shared state
    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum_middleware::from_fn(middleware::request_id::request_id))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config)),
        )
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
