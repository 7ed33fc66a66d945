//! In-process [`SessionStore`] used when no Redis URL is configured, and by
//! the test suites. A single mutex over all three indexes makes every
//! operation atomic, so the device-slot claim cannot interleave.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::session::Session;
use crate::services::session_store::{
    RemoveOutcome, SessionStore, SessionStoreError, StoreOutcome,
};

#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Indexes>,
}

#[derive(Default)]
struct Indexes {
    sessions: HashMap<String, Session>,
    user_tokens: HashMap<String, HashSet<String>>,
    device_sessions: HashMap<(String, String), Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops only the token record, leaving the user set and device mirror
    /// behind. This reproduces the index drift a TTL eviction causes in the
    /// Redis backend, which the pruning paths have to cope with.
    pub fn evict_token(&self, token: &str) {
        let mut inner = self.lock();
        inner.sessions.remove(token);
    }

    fn lock(&self) -> MutexGuard<'_, Indexes> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn store(&self, session: &Session) -> Result<StoreOutcome, SessionStoreError> {
        let mut inner = self.lock();

        let slot = (session.user_id.clone(), session.device_id.clone());
        if let Some(holder) = inner.device_sessions.get(&slot) {
            if holder.token != session.token && holder.is_usable(Utc::now()) {
                return Ok(StoreOutcome::DeviceConflict);
            }
        }

        inner
            .sessions
            .insert(session.token.clone(), session.clone());
        inner
            .user_tokens
            .entry(session.user_id.clone())
            .or_default()
            .insert(session.token.clone());
        inner.device_sessions.insert(slot, session.clone());
        Ok(StoreOutcome::Stored)
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, SessionStoreError> {
        Ok(self.lock().sessions.get(token).cloned())
    }

    async fn remove(&self, token: &str) -> Result<RemoveOutcome, SessionStoreError> {
        let mut inner = self.lock();

        let Some(session) = inner.sessions.remove(token) else {
            return Ok(RemoveOutcome::NotFound);
        };

        let user_emptied = match inner.user_tokens.get_mut(&session.user_id) {
            Some(tokens) => {
                tokens.remove(token);
                tokens.is_empty()
            }
            None => false,
        };
        if user_emptied {
            inner.user_tokens.remove(&session.user_id);
        }

        let slot = (session.user_id.clone(), session.device_id.clone());
        let owns_device = inner
            .device_sessions
            .get(&slot)
            .is_some_and(|holder| holder.token == session.token);
        if owns_device {
            inner.device_sessions.remove(&slot);
        }

        Ok(RemoveOutcome::Removed)
    }

    async fn is_logged_in_on_device(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<bool, SessionStoreError> {
        let inner = self.lock();
        let slot = (user_id.to_string(), device_id.to_string());
        Ok(inner
            .device_sessions
            .get(&slot)
            .is_some_and(|session| session.is_usable(Utc::now())))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, SessionStoreError> {
        let mut inner = self.lock();

        let tokens: Vec<String> = inner
            .user_tokens
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut sessions = Vec::with_capacity(tokens.len());
        let mut stale = Vec::new();
        for token in tokens {
            match inner.sessions.get(&token) {
                Some(session) => sessions.push(session.clone()),
                None => stale.push(token),
            }
        }

        if !stale.is_empty() {
            if let Some(set) = inner.user_tokens.get_mut(user_id) {
                for token in &stale {
                    set.remove(token);
                }
            }
            tracing::debug!(
                user_id = %user_id,
                pruned = stale.len(),
                "pruned stale session references"
            );
        }
        Ok(sessions)
    }

    async fn invalidate_others(
        &self,
        user_id: &str,
        keep_device_id: &str,
    ) -> Result<usize, SessionStoreError> {
        let mut inner = self.lock();

        let tokens: Vec<String> = inner
            .user_tokens
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut removed = 0usize;
        for token in tokens {
            let Some(session) = inner.sessions.get(&token).cloned() else {
                if let Some(set) = inner.user_tokens.get_mut(user_id) {
                    set.remove(&token);
                }
                continue;
            };
            if session.device_id == keep_device_id {
                continue;
            }

            inner.sessions.remove(&token);
            if let Some(set) = inner.user_tokens.get_mut(user_id) {
                set.remove(&token);
            }
            let slot = (session.user_id.clone(), session.device_id.clone());
            if inner
                .device_sessions
                .get(&slot)
                .is_some_and(|holder| holder.token == token)
            {
                inner.device_sessions.remove(&slot);
            }
            removed += 1;
        }
        Ok(removed)
    }

    async fn extend_expiry(
        &self,
        token: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<bool, SessionStoreError> {
        let mut inner = self.lock();

        let Some(session) = inner.sessions.get_mut(token) else {
            return Ok(false);
        };
        session.expiry_time = new_expiry;
        let updated = session.clone();

        let slot = (updated.user_id.clone(), updated.device_id.clone());
        if inner
            .device_sessions
            .get(&slot)
            .is_some_and(|holder| holder.token == token)
        {
            inner.device_sessions.insert(slot, updated);
        }
        Ok(true)
    }
}
