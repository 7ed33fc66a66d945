//! Account store consumed by the session service and the user handlers.
//!
//! The trait is designed to be mockable using mockall for testing.
//! Use `MockUserStore` in tests to mock the behavior.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::user::User;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks up an account eligible for login. Deactivated users are
    /// invisible here on purpose.
    async fn find_active_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    async fn insert(&self, user: &User) -> Result<(), AppError>;

    async fn username_exists(&self, username: &str) -> Result<bool, AppError>;

    async fn email_exists(&self, email: &str) -> Result<bool, AppError>;

    /// Records a successful login. Callers treat failures as non-fatal.
    async fn touch_last_login(&self, id: &str) -> Result<(), AppError>;
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_active_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password_hash, is_active, last_login_at, created_at, \
             updated_at FROM users WHERE username = $1 AND is_active = TRUE",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password_hash, is_active, last_login_at, created_at, \
             updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn insert(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, is_active, last_login_at, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn touch_last_login(&self, id: &str) -> Result<(), AppError> {
        let now = Utc::now();
        sqlx::query("UPDATE users SET last_login_at = $1, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
