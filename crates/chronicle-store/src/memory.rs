//! In-memory segment store.
//!
//! Keeps the exact serialized bytes a file store would write, segment by
//! segment, and applies the same rotation rules.  Reads go through the same
//! record parser, so behaviour matches `FileSegmentStore` apart from
//! durability.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, warn};

use chronicle_contracts::{
    error::{ChronicleError, ChronicleResult},
    event::AuditEvent,
    segment::{RetentionAnchor, SegmentId, SegmentInfo, SegmentRead},
};
use chronicle_core::traits::SegmentStore;

use crate::segment::{encode_record, next_segment, parse_segment, ActiveSegment};

#[derive(Debug, Default)]
struct MemoryState {
    /// chain id → segment id → raw bytes
    chains: BTreeMap<String, BTreeMap<SegmentId, Vec<u8>>>,
    anchors: HashMap<String, RetentionAnchor>,
}

/// A volatile `SegmentStore`.
#[derive(Debug)]
pub struct InMemorySegmentStore {
    max_segment_bytes: u64,
    state: Mutex<MemoryState>,
}

impl InMemorySegmentStore {
    pub fn new(max_segment_bytes: u64) -> Self {
        Self {
            max_segment_bytes,
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> ChronicleResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|e| ChronicleError::Persistence {
            reason: format!("memory store lock poisoned: {}", e),
        })
    }

    fn missing(segment: &SegmentId) -> ChronicleError {
        ChronicleError::Persistence {
            reason: format!("segment '{}' does not exist", segment),
        }
    }
}

impl Default for InMemorySegmentStore {
    fn default() -> Self {
        Self::new(chronicle_core::config::StoreConfig::default().max_segment_bytes)
    }
}

#[async_trait]
impl SegmentStore for InMemorySegmentStore {
    async fn append(&self, event: &AuditEvent) -> ChronicleResult<()> {
        let record = encode_record(event)?;
        let mut state = self.lock()?;
        let segments = state.chains.entry(event.chain_id.clone()).or_default();

        let active = segments.iter().next_back().map(|(id, bytes)| ActiveSegment {
            id: id.clone(),
            size: bytes.len() as u64,
            clean_tail: bytes.last().map_or(true, |b| *b == b'\n'),
        });
        let target = next_segment(
            active.as_ref(),
            &event.chain_id,
            event.timestamp.date_naive(),
            record.len() as u64,
            self.max_segment_bytes,
        );
        if active.as_ref().map(|a| &a.id) != Some(&target) {
            debug!(segment = %target, "rotating to new segment");
        }
        segments.entry(target).or_default().extend_from_slice(&record);
        Ok(())
    }

    async fn last_event(&self, chain_id: &str) -> ChronicleResult<Option<AuditEvent>> {
        let state = self.lock()?;
        let Some(segments) = state.chains.get(chain_id) else {
            return Ok(None);
        };
        for (id, bytes) in segments.iter().rev() {
            if let Some(event) = parse_segment(id, bytes).into_events().pop() {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    async fn chains(&self) -> ChronicleResult<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .chains
            .iter()
            .filter(|(_, segments)| !segments.is_empty())
            .map(|(chain_id, _)| chain_id.clone())
            .collect())
    }

    async fn segments(&self, chain_id: &str) -> ChronicleResult<Vec<SegmentInfo>> {
        let state = self.lock()?;
        Ok(state
            .chains
            .get(chain_id)
            .map(|segments| {
                segments
                    .iter()
                    .map(|(id, bytes)| SegmentInfo {
                        id: id.clone(),
                        size_bytes: bytes.len() as u64,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read_segment(&self, segment: &SegmentId) -> ChronicleResult<SegmentRead> {
        let state = self.lock()?;
        let bytes = state
            .chains
            .get(&segment.chain_id)
            .and_then(|segments| segments.get(segment))
            .ok_or_else(|| Self::missing(segment))?;
        let read = parse_segment(segment, bytes);
        for record in read.warnings() {
            warn!(
                segment = %record.segment,
                line = record.line,
                torn = record.torn,
                "skipping malformed segment record"
            );
        }
        Ok(read)
    }

    async fn delete_segment(&self, segment: &SegmentId) -> ChronicleResult<()> {
        let mut state = self.lock()?;
        if let Some(segments) = state.chains.get_mut(&segment.chain_id) {
            segments.remove(segment);
        }
        Ok(())
    }

    async fn clear(&self, chain_id: &str) -> ChronicleResult<u64> {
        let mut state = self.lock()?;
        state.anchors.remove(chain_id);
        Ok(state
            .chains
            .remove(chain_id)
            .map_or(0, |segments| segments.len() as u64))
    }

    async fn read_anchor(&self, chain_id: &str) -> ChronicleResult<Option<RetentionAnchor>> {
        Ok(self.lock()?.anchors.get(chain_id).cloned())
    }

    async fn write_anchor(&self, chain_id: &str, anchor: &RetentionAnchor) -> ChronicleResult<()> {
        self.lock()?
            .anchors
            .insert(chain_id.to_string(), anchor.clone());
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::Map;

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, day, 12, 0, 0).unwrap()
    }

    fn event(chain: &str, index: u64, timestamp: DateTime<Utc>) -> AuditEvent {
        AuditEvent {
            chain_id: chain.to_string(),
            sequence_index: index,
            initiator: "u1".to_string(),
            event_type: "LOGIN".to_string(),
            payload: Map::new(),
            timestamp,
            trace_id: "t".to_string(),
            previous_hash: AuditEvent::GENESIS_HASH.to_string(),
            hash: format!("{:064x}", index),
        }
    }

    #[tokio::test]
    async fn empty_store_has_nothing() {
        let store = InMemorySegmentStore::default();
        assert!(store.chains().await.unwrap().is_empty());
        assert!(store.segments("c1").await.unwrap().is_empty());
        assert_eq!(store.last_event("c1").await.unwrap(), None);
        assert!(store.read_chain("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn segments_rotate_per_day() {
        let store = InMemorySegmentStore::default();
        store.append(&event("c1", 0, at(1))).await.unwrap();
        store.append(&event("c1", 1, at(1))).await.unwrap();
        store.append(&event("c1", 2, at(3))).await.unwrap();

        let segments = store.segments("c1").await.unwrap();
        let dates: Vec<_> = segments.iter().map(|s| s.id.date).collect();
        assert_eq!(dates, vec![at(1).date_naive(), at(3).date_naive()]);

        let reads = store.read_chain("c1").await.unwrap();
        assert_eq!(reads[0].events().count(), 2);
        assert_eq!(reads[1].events().count(), 1);
        assert_eq!(
            store.last_event("c1").await.unwrap().map(|e| e.sequence_index),
            Some(2)
        );
    }

    #[tokio::test]
    async fn small_limit_rotates_every_record() {
        let store = InMemorySegmentStore::new(1);
        for i in 0..3 {
            store.append(&event("c1", i, at(1))).await.unwrap();
        }
        let parts: Vec<u32> = store
            .segments("c1")
            .await
            .unwrap()
            .iter()
            .map(|s| s.id.part)
            .collect();
        assert_eq!(parts, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn reading_a_missing_segment_is_a_persistence_error() {
        let store = InMemorySegmentStore::default();
        let id = SegmentId {
            chain_id: "c1".to_string(),
            date: at(1).date_naive(),
            part: 0,
        };
        assert!(matches!(
            store.read_segment(&id).await,
            Err(ChronicleError::Persistence { .. })
        ));
    }

    #[tokio::test]
    async fn clear_drops_segments_and_anchor() {
        let store = InMemorySegmentStore::default();
        store.append(&event("c1", 0, at(1))).await.unwrap();
        store.append(&event("c1", 1, at(2))).await.unwrap();
        store
            .write_anchor(
                "c1",
                &RetentionAnchor {
                    sequence_index: 1,
                    previous_hash: "00".repeat(32),
                    pruned_at: at(2),
                },
            )
            .await
            .unwrap();

        assert_eq!(store.clear("c1").await.unwrap(), 2);
        assert!(store.chains().await.unwrap().is_empty());
        assert_eq!(store.read_anchor("c1").await.unwrap(), None);
    }
}
