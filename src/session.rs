//! Per-session cart and ingestion queue
//!
//! Nothing here is persisted. A session's state disappears when it is
//! idle for longer than the configured TTL.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::ingest::{CopyTracker, IngestionQueue};

/// Set of record identifiers picked by the user
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartState {
    ids: BTreeSet<String>,
}

impl CartState {
    /// Returns how many identifiers were new
    pub fn add<I: IntoIterator<Item = String>>(&mut self, ids: I) -> usize {
        ids.into_iter().filter(|id| self.ids.insert(id.clone())).count()
    }

    /// Returns how many identifiers were present
    pub fn remove<'a, I: IntoIterator<Item = &'a String>>(&mut self, ids: I) -> usize {
        ids.into_iter().filter(|id| self.ids.remove(*id)).count()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn list(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Mutable state owned by one browser session
#[derive(Debug)]
pub struct SessionContext {
    pub cart: CartState,
    pub queue: IngestionQueue,
    last_seen: Instant,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            cart: CartState::default(),
            queue: IngestionQueue::new(),
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedSession = Arc<Mutex<SessionContext>>;

/// All live sessions, keyed by the client-chosen session id
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SharedSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing session or a fresh empty one
    pub async fn get_or_create(&self, session_id: &str) -> SharedSession {
        if let Some(session) = self.sessions.read().await.get(session_id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!("🆕 New session: {}", session_id);
                Arc::new(Mutex::new(SessionContext::new()))
            })
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle for at least `ttl`, releasing their copy records;
    /// returns how many were dropped. Sessions busy in a request are kept.
    pub async fn expire_idle(&self, ttl: Duration, tracker: &CopyTracker) -> usize {
        let mut tokens = Vec::new();
        let expired = {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, session| match session.try_lock() {
                Ok(context) if context.idle_for() >= ttl => {
                    tokens.extend(context.queue.copy_tokens());
                    false
                }
                _ => true,
            });
            before - sessions.len()
        };

        tracker.release_all(tokens).await;
        if expired > 0 {
            info!("⏰ Expired {} idle sessions", expired);
        }
        expired
    }

    /// Periodically expire idle sessions until the runtime shuts down
    pub fn spawn_sweeper(&self, ttl: Duration, tracker: CopyTracker) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        let period = (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(300));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                registry.expire_idle(ttl, &tracker).await;
            }
        })
    }
}
