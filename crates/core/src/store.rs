//! Session Store
//!
//! The store is the single authority over session state. Callers never
//! hold a live reference to a session; they either read a snapshot or
//! submit a closure that runs under that session's own lock. Concurrent
//! operations against the same id serialize on the per-id mutex, so two
//! near-simultaneous validations can never both observe the same stale
//! phase. Distinct ids share nothing and proceed in parallel.
//!
//! The trait is the seam for a future distributed backend; the in-memory
//! implementation here is the single-process authority the system ships
//! with. Sessions expire after an inactivity TTL, after which an id is
//! indistinguishable from one that never existed.

use crate::session::WakeSession;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("session not found")]
    NotFound,
}

/// Injectable session storage: create, snapshot, mutate-under-lock, expire.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Registers a freshly created session.
    async fn insert(&self, session: WakeSession);

    /// Returns a snapshot of the session, or `NotFound` if the id is
    /// unknown or expired.
    async fn get(&self, id: Uuid) -> Result<WakeSession, StoreError>;

    /// Runs `f` with exclusive access to the session and returns its
    /// result. The session's activity clock is bumped afterwards.
    async fn mutate<F, R>(&self, id: Uuid, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut WakeSession) -> R + Send,
        R: Send;

    /// Drops sessions idle past the TTL; returns how many were removed.
    async fn expire_idle(&self) -> usize;
}

/// Single-process store backed by a map of per-id mutexes.
pub struct InMemorySessionStore {
    ttl: Duration,
    sessions: StdMutex<HashMap<Uuid, Arc<Mutex<WakeSession>>>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: StdMutex::new(HashMap::new()),
        }
    }

    /// Grabs the per-id entry without holding the outer map lock across
    /// any await point.
    fn entry(&self, id: Uuid) -> Option<Arc<Mutex<WakeSession>>> {
        self.sessions.lock().expect("session map poisoned").get(&id).cloned()
    }

    fn drop_entry(&self, id: Uuid) {
        self.sessions.lock().expect("session map poisoned").remove(&id);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: WakeSession) {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .insert(session.id, Arc::new(Mutex::new(session)));
    }

    async fn get(&self, id: Uuid) -> Result<WakeSession, StoreError> {
        let entry = self.entry(id).ok_or(StoreError::NotFound)?;
        let guard = entry.lock().await;
        if guard.is_idle_expired(self.ttl, Utc::now()) {
            drop(guard);
            self.drop_entry(id);
            debug!(session_id = %id, "expired session treated as not found");
            return Err(StoreError::NotFound);
        }
        Ok(guard.clone())
    }

    async fn mutate<F, R>(&self, id: Uuid, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut WakeSession) -> R + Send,
        R: Send,
    {
        let entry = self.entry(id).ok_or(StoreError::NotFound)?;
        let mut guard = entry.lock().await;
        if guard.is_idle_expired(self.ttl, Utc::now()) {
            drop(guard);
            self.drop_entry(id);
            return Err(StoreError::NotFound);
        }
        let result = f(&mut guard);
        guard.touch();
        Ok(result)
    }

    async fn expire_idle(&self) -> usize {
        let now = Utc::now();
        let stale: Vec<Uuid> = {
            let map = self.sessions.lock().expect("session map poisoned");
            map.iter()
                .filter_map(|(id, entry)| {
                    // try_lock: a session busy in a request is by
                    // definition not idle.
                    entry
                        .try_lock()
                        .ok()
                        .filter(|s| s.is_idle_expired(self.ttl, now))
                        .map(|_| *id)
                })
                .collect()
        };
        for id in &stale {
            self.drop_entry(*id);
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "swept idle sessions");
        }
        stale.len()
    }
}
