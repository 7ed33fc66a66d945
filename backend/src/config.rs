use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// When unset the server falls back to the in-memory session store.
    pub redis_url: Option<String>,
    pub redis_pool_size: u32,
    pub redis_connect_timeout: u64,
    pub jwt_secret: String,
    pub session_ttl_minutes: u64,
    pub session_key_prefix: String,
    pub bind_addr: String,
    pub cors_allow_origins: Vec<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/sessiongate".to_string());

        let redis_url = env::var("REDIS_URL").ok().filter(|url| !url.is_empty());

        let redis_pool_size = env::var("REDIS_POOL_SIZE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let redis_connect_timeout = env::var("REDIS_CONNECT_TIMEOUT")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "your-secret-key-change-this-in-production".to_string());

        let session_ttl_minutes = env::var("SESSION_TTL_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);

        let session_key_prefix =
            env::var("SESSION_KEY_PREFIX").unwrap_or_else(|_| "sessiongate:".to_string());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Config {
            database_url,
            redis_url,
            redis_pool_size,
            redis_connect_timeout,
            jwt_secret,
            session_ttl_minutes,
            session_key_prefix,
            bind_addr,
            cors_allow_origins,
        })
    }
}
