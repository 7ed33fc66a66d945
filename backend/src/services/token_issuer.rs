use uuid::Uuid;

use crate::models::user::User;
use crate::utils::jwt::{create_session_token, verify_session_token};

/// Issues and checks the bearer tokens handed out at login.
///
/// Kept behind a trait so the session service can be exercised without a
/// real signing secret.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user: &User) -> anyhow::Result<String>;

    /// Opaque refresh handle returned alongside the session token. Its
    /// lifecycle is not tracked by the session store.
    fn issue_refresh(&self) -> String;

    fn verify(&self, token: &str) -> bool;

    /// The user id baked into the token, if the token verifies.
    fn identity_of(&self, token: &str) -> Option<String>;
}

pub struct JwtTokenIssuer {
    secret: String,
    ttl_minutes: i64,
}

impl JwtTokenIssuer {
    pub fn new(secret: String, ttl_minutes: i64) -> Self {
        Self {
            secret,
            ttl_minutes,
        }
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(&self, user: &User) -> anyhow::Result<String> {
        create_session_token(
            user.id.clone(),
            user.username.clone(),
            &self.secret,
            self.ttl_minutes,
        )
    }

    fn issue_refresh(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn verify(&self, token: &str) -> bool {
        verify_session_token(token, &self.secret).is_ok()
    }

    fn identity_of(&self, token: &str) -> Option<String> {
        verify_session_token(token, &self.secret)
            .ok()
            .map(|claims| claims.sub)
    }
}
