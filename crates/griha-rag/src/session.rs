//! Session Context Store
//!
//! Loads, merges and saves per-conversation state against an expiring
//! key-value collaborator. The read-modify-write sequence is serialized per
//! conversation id inside the process; across processes the cache write is
//! last-writer-wins. When the cache is unavailable the store degrades to
//! memoryless single-turn operation — retrieval never depends on memory.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Instant;

use crate::types::{ConstraintSet, Intent, SessionContext};

/// Expiring key-value collaborator. The external cache enforces the TTL;
/// an expired entry is indistinguishable from one that never existed.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-process cache honouring TTLs. Used in tests and cache-less deployments.
pub struct InMemorySessionCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let expired = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some((value, expires_at)) => {
                    if Instant::now() < *expires_at {
                        return Ok(Some(value.clone()));
                    }
                    true
                }
                None => false,
            }
        };
        if expired {
            self.entries.write().remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        // Writes double as the sweep point: expired entries whose keys are
        // never read again would otherwise sit in the map forever.
        entries.retain(|_, (_, expires_at)| now < *expires_at);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

pub struct SessionStore {
    cache: Arc<dyn SessionCache>,
    ttl: Duration,
    cache_timeout: Duration,
    /// Per-conversation-id locks serializing load-merge-save.
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn SessionCache>, ttl: Duration, cache_timeout: Duration) -> Self {
        Self {
            cache,
            ttl,
            cache_timeout,
            locks: DashMap::new(),
        }
    }

    fn key(conversation_id: &str) -> String {
        format!("session:{}", conversation_id)
    }

    fn lock_for(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once nobody else holds it. `entry` and
    /// `remove_if` serialize on the same shard, so a count of 1 means the
    /// map holds the only reference and the entry can go.
    fn release_lock(&self, conversation_id: &str) {
        self.locks
            .remove_if(conversation_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Load the context for a conversation. Absent, expired, unreadable and
    /// cache-failure cases all come back as `None` — a fresh context begins.
    pub async fn load(&self, conversation_id: &str) -> Option<SessionContext> {
        let key = Self::key(conversation_id);
        let fetched = tokio::time::timeout(self.cache_timeout, self.cache.get(&key)).await;
        let raw = match fetched {
            Ok(Ok(raw)) => raw?,
            Ok(Err(e)) => {
                tracing::warn!(conversation_id, error = %e, "session cache get failed, starting fresh context");
                return None;
            }
            Err(_) => {
                tracing::warn!(conversation_id, "session cache get timed out, starting fresh context");
                return None;
            }
        };
        match serde_json::from_str::<SessionContext>(&raw) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "stored session context unreadable, discarding");
                None
            }
        }
    }

    /// Atomically fold one turn into the conversation's context and persist
    /// it, refreshing the TTL. A failing save degrades to single-turn
    /// operation: the merged context is still returned for this turn, it
    /// just won't be remembered.
    pub async fn merge_and_save(
        &self,
        conversation_id: &str,
        new: &ConstraintSet,
        intent: Intent,
    ) -> SessionContext {
        let lock = self.lock_for(conversation_id);
        let guard = lock.lock().await;
        let merged = self.merge_and_save_locked(conversation_id, new, intent).await;
        drop(guard);
        drop(lock);
        self.release_lock(conversation_id);
        merged
    }

    async fn merge_and_save_locked(
        &self,
        conversation_id: &str,
        new: &ConstraintSet,
        intent: Intent,
    ) -> SessionContext {
        let prior = self
            .load(conversation_id)
            .await
            .unwrap_or_else(SessionContext::new);
        let merged = prior.merge_turn(new, intent);

        let key = Self::key(conversation_id);
        let payload = match serde_json::to_string(&merged) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "session context serialization failed");
                return merged;
            }
        };
        let saved =
            tokio::time::timeout(self.cache_timeout, self.cache.set(&key, payload, self.ttl)).await;
        match saved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(conversation_id, error = %e, "session cache set failed, context is single-turn only");
            }
            Err(_) => {
                tracing::warn!(conversation_id, "session cache set timed out, context is single-turn only");
            }
        }
        merged
    }

    pub async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.cache.delete(&Self::key(conversation_id)).await
    }
}
