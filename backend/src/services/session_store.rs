//! Session persistence behind a swappable trait.
//!
//! The Redis layout uses three views of every session so each lookup is a
//! single key operation:
//!
//! - `{prefix}session:{token}` holds the serialized session itself,
//! - `{prefix}user:{user_id}:sessions` is the set of that user's tokens,
//! - `{prefix}user:{user_id}:device:{device_id}` mirrors the session that
//!   currently owns the device slot.
//!
//! Every key carries the session TTL so abandoned records age out on their
//! own. TTL eviction is only a cleanup mechanism; expiry decisions always go
//! through [`Session::is_usable`].
//!
//! The token record and the device mirror always carry the same payload
//! bytes. The slot is claimed with `SET NX` and released through a
//! compare-and-delete script, so a stale observer can neither overwrite nor
//! delete a claim it never read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bb8_redis::redis::{self, aio::ConnectionLike, AsyncCommands};

use crate::db::redis::RedisPool;
use crate::models::session::Session;

/// Result of attempting to persist a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// Another live session already owns the user/device slot.
    DeviceConflict,
}

/// Result of removing a session by token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("failed to check out a store connection: {0}")]
    Pool(#[from] bb8::RunError<bb8_redis::redis::RedisError>),
    #[error("store backend error: {0}")]
    Backend(#[from] bb8_redis::redis::RedisError),
    #[error("failed to serialize session record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage contract for session records.
///
/// Implementations must keep the device slot exclusive: `store` may only
/// succeed when no other live session holds the same `(user_id, device_id)`
/// pair, and concurrent calls for the same pair must not both return
/// [`StoreOutcome::Stored`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists the session under all three views, or reports a conflict if
    /// the device slot is taken by a different live session. Re-storing a
    /// session under its own token refreshes it in place.
    async fn store(&self, session: &Session) -> Result<StoreOutcome, SessionStoreError>;

    /// Looks up a session by its token.
    async fn get(&self, token: &str) -> Result<Option<Session>, SessionStoreError>;

    /// Removes the session and its index entries. The device slot is only
    /// released while this token still owns it.
    async fn remove(&self, token: &str) -> Result<RemoveOutcome, SessionStoreError>;

    /// Whether a live session currently occupies the device slot.
    async fn is_logged_in_on_device(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<bool, SessionStoreError>;

    /// Returns every session recorded for the user, healing index entries
    /// whose records have been evicted and skipping unreadable records.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, SessionStoreError>;

    /// Removes every session of the user except those on `keep_device_id`,
    /// returning how many were removed. Removals already applied stay
    /// applied if a later step fails.
    async fn invalidate_others(
        &self,
        user_id: &str,
        keep_device_id: &str,
    ) -> Result<usize, SessionStoreError>;

    /// Moves the session's expiry, refreshing store TTLs along the way.
    /// Returns `false` when the token is unknown or the device slot has
    /// since been reclaimed.
    async fn extend_expiry(
        &self,
        token: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<bool, SessionStoreError>;
}

pub struct RedisSessionStore {
    pool: RedisPool,
    prefix: String,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(pool: RedisPool, prefix: String, ttl_seconds: u64) -> Self {
        Self {
            pool,
            prefix,
            ttl_seconds,
        }
    }

    fn session_key(&self, token: &str) -> String {
        format!("{}session:{}", self.prefix, token)
    }

    fn user_sessions_key(&self, user_id: &str) -> String {
        format!("{}user:{}:sessions", self.prefix, user_id)
    }

    fn device_key(&self, user_id: &str, device_id: &str) -> String {
        format!("{}user:{}:device:{}", self.prefix, user_id, device_id)
    }
}

/// `SET key value NX EX ttl`: claims the key only if it does not exist yet.
async fn set_if_absent<C>(
    conn: &mut C,
    key: &str,
    value: &str,
    ttl_seconds: u64,
) -> Result<bool, SessionStoreError>
where
    C: ConnectionLike + Send,
{
    let outcome: Option<String> = redis::cmd("SET")
        .arg(key)
        .arg(value)
        .arg("NX")
        .arg("EX")
        .arg(ttl_seconds)
        .query_async(conn)
        .await?;
    Ok(outcome.is_some())
}

const DELETE_IF_VALUE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Deletes the key only while it still holds the expected value. Comparison
/// and delete run as one server-side script, so a value written in between
/// is never lost to a stale observer.
async fn delete_if_value<C>(
    conn: &mut C,
    key: &str,
    value: &str,
) -> Result<bool, SessionStoreError>
where
    C: ConnectionLike + Send,
{
    let deleted: i32 = redis::cmd("EVAL")
        .arg(DELETE_IF_VALUE)
        .arg(1)
        .arg(key)
        .arg(value)
        .query_async(conn)
        .await?;
    Ok(deleted == 1)
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn store(&self, session: &Session) -> Result<StoreOutcome, SessionStoreError> {
        let payload = serde_json::to_string(session)?;
        let token_key = self.session_key(&session.token);
        let user_key = self.user_sessions_key(&session.user_id);
        let device_key = self.device_key(&session.user_id, &session.device_id);

        let mut conn = self.pool.get().await?;

        // Claim the device slot first. The conditional write is what makes
        // two concurrent logins on the same device resolve to one winner.
        if !set_if_absent(&mut *conn, &device_key, &payload, self.ttl_seconds).await? {
            let holder_raw: Option<String> = conn.get(&device_key).await?;
            match holder_raw {
                Some(raw) => {
                    let holder: Session = serde_json::from_str(&raw)?;
                    if holder.token != session.token {
                        if holder.is_usable(Utc::now()) {
                            return Ok(StoreOutcome::DeviceConflict);
                        }
                        // The slot holder is expired but not yet evicted.
                        // Drop it only while it is still the value read
                        // above, then race for the slot once more. A
                        // parallel reclaim that already won keeps its claim
                        // and the retry below loses to it.
                        delete_if_value(&mut *conn, &device_key, &raw).await?;
                        if !set_if_absent(&mut *conn, &device_key, &payload, self.ttl_seconds)
                            .await?
                        {
                            return Ok(StoreOutcome::DeviceConflict);
                        }
                    }
                }
                // The claim vanished between SET and GET, likely a TTL
                // eviction. One more attempt before conceding the slot.
                None => {
                    if !set_if_absent(&mut *conn, &device_key, &payload, self.ttl_seconds).await? {
                        return Ok(StoreOutcome::DeviceConflict);
                    }
                }
            }
        }

        redis::pipe()
            .atomic()
            .set_ex(&token_key, &payload, self.ttl_seconds)
            .set_ex(&device_key, &payload, self.ttl_seconds)
            .sadd(&user_key, &session.token)
            .expire(&user_key, self.ttl_seconds as i64)
            .query_async::<_, ()>(&mut *conn)
            .await?;

        tracing::debug!(
            user_id = %session.user_id,
            device_id = %session.device_id,
            "session stored"
        );
        Ok(StoreOutcome::Stored)
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, SessionStoreError> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.get(self.session_key(token)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, token: &str) -> Result<RemoveOutcome, SessionStoreError> {
        let mut conn = self.pool.get().await?;

        let token_key = self.session_key(token);
        let raw: Option<String> = conn.get(&token_key).await?;
        let Some(raw) = raw else {
            return Ok(RemoveOutcome::NotFound);
        };
        let session: Session = serde_json::from_str(&raw)?;

        let user_key = self.user_sessions_key(&session.user_id);
        let device_key = self.device_key(&session.user_id, &session.device_id);

        // Release the device slot only while it still carries this session's
        // payload. After this session expires, a newer login may have claimed
        // the slot, and that claim has to survive the removal.
        delete_if_value(&mut *conn, &device_key, &raw).await?;

        redis::pipe()
            .atomic()
            .del(&token_key)
            .srem(&user_key, token)
            .query_async::<_, ()>(&mut *conn)
            .await?;

        tracing::debug!(
            user_id = %session.user_id,
            device_id = %session.device_id,
            "session removed"
        );
        Ok(RemoveOutcome::Removed)
    }

    async fn is_logged_in_on_device(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<bool, SessionStoreError> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.get(self.device_key(user_id, device_id)).await?;
        match raw {
            Some(raw) => {
                let session: Session = serde_json::from_str(&raw)?;
                Ok(session.is_usable(Utc::now()))
            }
            None => Ok(false),
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, SessionStoreError> {
        let mut conn = self.pool.get().await?;
        let user_key = self.user_sessions_key(user_id);
        let tokens: Vec<String> = conn.smembers(&user_key).await?;

        let mut sessions = Vec::with_capacity(tokens.len());
        for token in tokens {
            let raw: Option<String> = conn.get(self.session_key(&token)).await?;
            match raw {
                Some(raw) => match serde_json::from_str::<Session>(&raw) {
                    Ok(session) => sessions.push(session),
                    Err(err) => {
                        tracing::warn!(
                            user_id = %user_id,
                            error = %err,
                            "skipping unreadable session record"
                        );
                    }
                },
                None => {
                    // The record was evicted out from under the set; heal
                    // the index so the dangling token stops showing up.
                    if let Err(err) = conn.srem::<_, _, ()>(&user_key, &token).await {
                        tracing::warn!(
                            user_id = %user_id,
                            error = %err,
                            "failed to prune stale session reference"
                        );
                    } else {
                        tracing::debug!(user_id = %user_id, "pruned stale session reference");
                    }
                }
            }
        }
        Ok(sessions)
    }

    async fn invalidate_others(
        &self,
        user_id: &str,
        keep_device_id: &str,
    ) -> Result<usize, SessionStoreError> {
        let mut conn = self.pool.get().await?;
        let user_key = self.user_sessions_key(user_id);
        let tokens: Vec<String> = conn.smembers(&user_key).await?;

        let mut removed = 0usize;
        for token in tokens {
            let raw: Option<String> = conn.get(self.session_key(&token)).await?;
            let Some(raw) = raw else {
                if let Err(err) = conn.srem::<_, _, ()>(&user_key, &token).await {
                    tracing::warn!(
                        user_id = %user_id,
                        error = %err,
                        "failed to prune stale session reference"
                    );
                }
                continue;
            };
            let session: Session = serde_json::from_str(&raw)?;
            if session.device_id == keep_device_id {
                continue;
            }

            // Same guarded release as `remove`: an expired session's slot may
            // already belong to a newer login.
            let device_key = self.device_key(user_id, &session.device_id);
            delete_if_value(&mut *conn, &device_key, &raw).await?;
            redis::pipe()
                .atomic()
                .del(self.session_key(&token))
                .srem(&user_key, &token)
                .query_async::<_, ()>(&mut *conn)
                .await?;
            removed += 1;
        }

        tracing::debug!(user_id = %user_id, removed, "invalidated other-device sessions");
        Ok(removed)
    }

    async fn extend_expiry(
        &self,
        token: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<bool, SessionStoreError> {
        let Some(mut session) = self.get(token).await? else {
            return Ok(false);
        };
        session.expiry_time = new_expiry;
        match self.store(&session).await? {
            StoreOutcome::Stored => Ok(true),
            StoreOutcome::DeviceConflict => {
                tracing::warn!(
                    user_id = %session.user_id,
                    device_id = %session.device_id,
                    "device slot reclaimed; expiry not extended"
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb8_redis::RedisConnectionManager;

    fn unconnected_store(prefix: &str) -> RedisSessionStore {
        let manager =
            RedisConnectionManager::new("redis://127.0.0.1:6379").expect("manager from url");
        let pool = bb8::Pool::builder().build_unchecked(manager);
        RedisSessionStore::new(pool, prefix.to_string(), 60)
    }

    #[tokio::test]
    async fn keys_are_namespaced_per_user_and_device() {
        let store = unconnected_store("gate:");
        assert_eq!(store.session_key("tok-1"), "gate:session:tok-1");
        assert_eq!(store.user_sessions_key("u-1"), "gate:user:u-1:sessions");
        assert_eq!(
            store.device_key("u-1", "dev-a"),
            "gate:user:u-1:device:dev-a"
        );
    }

    #[tokio::test]
    async fn prefix_is_carried_verbatim() {
        let store = unconnected_store("");
        assert_eq!(store.session_key("t"), "session:t");
    }
}
