//! In-memory implementation of `MemoryStore`.
//!
//! Sessions are keyed by session id. Long-term memory is keyed by
//! (namespace, key) and entries may carry an expiry; expired entries read as
//! absent and are dropped on access.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use waypoint_contracts::{
    error::{EngineError, EngineResult},
    session::SessionState,
};
use waypoint_core::traits::MemoryStore;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionState>,
    long_term: HashMap<(String, String), MemoryEntry>,
}

/// A process-local `MemoryStore`. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.lock().map(|inner| inner.sessions.len()).unwrap_or(0)
    }

    /// Drop every expired long-term entry; returns how many were removed.
    pub fn purge_expired(&self) -> EngineResult<usize> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let before = inner.long_term.len();
        inner.long_term.retain(|_, entry| !entry.is_expired(now));
        Ok(before - inner.long_term.len())
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|e| EngineError::Store {
            reason: format!("memory store lock poisoned: {}", e),
        })
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn get_session_state(&self, session_id: &str) -> EngineResult<Option<SessionState>> {
        Ok(self.lock()?.sessions.get(session_id).cloned())
    }

    async fn set_session_state(&self, session_id: &str, state: &SessionState) -> EngineResult<()> {
        debug!(
            session_id = %session_id,
            state = %state.current_state,
            messages = state.history.len(),
            "session saved"
        );
        self.lock()?
            .sessions
            .insert(session_id.to_string(), state.clone());
        Ok(())
    }

    async fn get_long_term_memory(&self, namespace: &str, key: &str) -> EngineResult<Option<Value>> {
        let mut inner = self.lock()?;
        let slot = (namespace.to_string(), key.to_string());
        match inner.long_term.get(&slot) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(Utc::now()) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }

        debug!(namespace = %namespace, key = %key, "long-term entry expired");
        inner.long_term.remove(&slot);
        Ok(None)
    }

    async fn set_long_term_memory(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> EngineResult<()> {
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        });
        self.lock()?.long_term.insert(
            (namespace.to_string(), key.to_string()),
            MemoryEntry { value, expires_at },
        );
        Ok(())
    }
}
