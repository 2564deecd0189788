//! Per-chain recorder state: the tail cache and the append locks.
//!
//! Both are explicit, injectable values keyed by chain id rather than
//! process-wide singletons, so independent recorders (and tests) never share
//! state by accident.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use chronicle_contracts::event::AuditEvent;

/// The last durable link of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTail {
    pub sequence_index: u64,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&AuditEvent> for ChainTail {
    fn from(event: &AuditEvent) -> Self {
        Self {
            sequence_index: event.sequence_index,
            hash: event.hash.clone(),
            timestamp: event.timestamp,
        }
    }
}

/// In-memory cache of each chain's tail, backed by the segment store.
///
/// A missing entry means "ask the store".  Entries are invalidated whenever
/// a write fails so a retry re-reads what is actually durable.
#[derive(Debug, Default)]
pub struct TailCache {
    tails: Mutex<HashMap<String, ChainTail>>,
}

impl TailCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chain_id: &str) -> Option<ChainTail> {
        self.tails
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(chain_id)
            .cloned()
    }

    pub fn put(&self, chain_id: &str, tail: ChainTail) {
        self.tails
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(chain_id.to_string(), tail);
    }

    pub fn invalidate(&self, chain_id: &str) {
        self.tails
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(chain_id);
    }

    pub fn invalidate_all(&self) {
        self.tails.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// One async lock per chain.
///
/// Holding a chain's guard excludes every other append, clear or prune on
/// that chain.  Different chains never contend.
#[derive(Debug, Default)]
pub struct ChainLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ChainLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `chain_id`.
    pub async fn lock(&self, chain_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(chain_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn cache_put_get_invalidate() {
        let cache = TailCache::new();
        let tail = ChainTail {
            sequence_index: 3,
            hash: "ab".repeat(32),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        };
        assert_eq!(cache.get("c1"), None);

        cache.put("c1", tail.clone());
        assert_eq!(cache.get("c1"), Some(tail));
        assert_eq!(cache.get("c2"), None);

        cache.invalidate("c1");
        assert_eq!(cache.get("c1"), None);
    }

    #[tokio::test]
    async fn same_chain_lock_is_exclusive() {
        let locks = Arc::new(ChainLocks::new());
        let guard = locks.lock("c1").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.lock("c1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished(), "second lock must wait");

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_chains_do_not_contend() {
        let locks = ChainLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
    }
}
