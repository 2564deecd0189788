//! The chain recorder: the only writer of audit events.
//!
//! An append runs entirely under the chain's lock:
//!
//! 1. validate the request and check the payload canonicalizes
//! 2. read the tail from the cache, falling back to the store
//! 3. assign index, previous hash and a non-decreasing timestamp
//! 4. hash, append durably, then update the cache
//!
//! The cache is only written after the store has accepted the record, so a
//! failed write never leaves a phantom tail behind.  Step 4 runs in its own
//! task that owns the chain guard: once the write has started, dropping the
//! caller's future cannot separate the record on disk from the cached tail.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info};

use chronicle_contracts::{
    error::{ChronicleError, ChronicleResult},
    event::{new_trace_id, AppendRequest, AuditEvent},
    payload::AuditPayload,
    telemetry::{TelemetryOutcome, TelemetryRecord},
};
use chronicle_core::traits::{Clock, SegmentStore, TelemetrySink};

use crate::canonical;
use crate::chain::hash_event;
use crate::tail::{ChainLocks, ChainTail, TailCache};

/// Appends events to hash chains.
pub struct ChainRecorder {
    store: Arc<dyn SegmentStore>,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    tails: Arc<TailCache>,
    locks: ChainLocks,
}

impl ChainRecorder {
    pub fn new(
        store: Arc<dyn SegmentStore>,
        telemetry: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            telemetry,
            clock,
            tails: Arc::new(TailCache::new()),
            locks: ChainLocks::new(),
        }
    }

    /// Append one event and return it as stored.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank chain id, initiator or event type, or a
    ///   payload that is not a JSON object.  Nothing is written.
    /// - `Encoding` when the payload cannot be canonicalized.  Nothing is
    ///   written.
    /// - `Persistence` when the store rejects the write.  The chain's cached
    ///   tail is dropped so the next append re-reads the store.
    pub async fn append(&self, request: AppendRequest) -> ChronicleResult<AuditEvent> {
        let guard = self.locks.lock(&request.chain_id).await;
        self.append_locked(request, guard).await
    }

    /// Append a typed payload; the event type comes from the variant.
    pub async fn append_typed(
        &self,
        chain_id: &str,
        initiator: &str,
        payload: &AuditPayload,
    ) -> ChronicleResult<AuditEvent> {
        let value = payload.to_value().map_err(|e| ChronicleError::Encoding {
            reason: format!("payload cannot be represented as JSON: {}", e),
        })?;
        self.append(
            AppendRequest::new(chain_id, initiator, payload.event_type()).with_payload(value),
        )
        .await
    }

    /// Exclude every append to `chain_id` until the guard is dropped.
    pub async fn lock_chain(&self, chain_id: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(chain_id).await
    }

    pub fn tail_cache(&self) -> &TailCache {
        &self.tails
    }

    pub fn store(&self) -> &Arc<dyn SegmentStore> {
        &self.store
    }

    // ── Internal ──────────────────────────────────────────────────────────────

    async fn append_locked(
        &self,
        request: AppendRequest,
        guard: OwnedMutexGuard<()>,
    ) -> ChronicleResult<AuditEvent> {
        let trace_id = request
            .trace_id
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(new_trace_id);

        let result = self.seal_and_write(&request, &trace_id, guard).await;

        let outcome = match &result {
            Ok(event) => TelemetryOutcome::Appended {
                sequence_index: event.sequence_index,
                hash_prefix: event.hash_prefix().to_string(),
            },
            Err(e) => TelemetryOutcome::AppendFailed {
                reason: e.to_string(),
            },
        };
        self.telemetry.emit(TelemetryRecord {
            trace_id,
            chain_id: request.chain_id.clone(),
            event_type: request.event_type.clone(),
            timestamp: result
                .as_ref()
                .map(|e| e.timestamp)
                .unwrap_or_else(|_| self.clock.now()),
            outcome,
        });

        result
    }

    async fn seal_and_write(
        &self,
        request: &AppendRequest,
        trace_id: &str,
        guard: OwnedMutexGuard<()>,
    ) -> ChronicleResult<AuditEvent> {
        validate(request)?;
        let payload = match &request.payload {
            Value::Object(map) => map.clone(),
            _ => return Err(ChronicleError::validation("payload must be a JSON object")),
        };
        canonical::check(&request.payload)?;

        let tail = self.tail(&request.chain_id).await?;
        let now = truncate_to_millis(self.clock.now());
        let (sequence_index, previous_hash, timestamp) = match &tail {
            Some(tail) => (
                tail.sequence_index + 1,
                tail.hash.clone(),
                now.max(tail.timestamp),
            ),
            None => (0, AuditEvent::GENESIS_HASH.to_string(), now),
        };

        let mut event = AuditEvent {
            chain_id: request.chain_id.clone(),
            sequence_index,
            initiator: request.initiator.clone(),
            event_type: request.event_type.clone(),
            payload,
            timestamp,
            trace_id: trace_id.to_string(),
            previous_hash,
            hash: String::new(),
        };
        event.hash = hash_event(&event)?;

        let chain_id = event.chain_id.clone();
        let sequence_index = event.sequence_index;
        let store = Arc::clone(&self.store);
        let tails = Arc::clone(&self.tails);
        let write = tokio::spawn(async move {
            let _guard = guard;
            match store.append(&event).await {
                Ok(()) => {
                    tails.put(&event.chain_id, ChainTail::from(&event));
                    Ok(event)
                }
                Err(e) => {
                    tails.invalidate(&event.chain_id);
                    Err(e)
                }
            }
        });
        let written = match write.await {
            Ok(written) => written,
            Err(e) => {
                self.tails.invalidate(&chain_id);
                Err(ChronicleError::persistence(format!("audit write task failed: {}", e)))
            }
        };
        let event = written.map_err(|e| {
            error!(
                chain_id = %chain_id,
                sequence_index,
                error = %e,
                "audit append failed"
            );
            e
        })?;

        info!(
            chain_id = %event.chain_id,
            sequence_index = event.sequence_index,
            event_type = %event.event_type,
            hash = %event.hash_prefix(),
            "audit event appended"
        );
        Ok(event)
    }

    async fn tail(&self, chain_id: &str) -> ChronicleResult<Option<ChainTail>> {
        if let Some(tail) = self.tails.get(chain_id) {
            return Ok(Some(tail));
        }
        let mut tail = self.store.last_event(chain_id).await?.map(|e| ChainTail::from(&e));
        if tail.is_none() {
            // Every segment pruned: continue from where retention left off.
            tail = self.store.read_anchor(chain_id).await?.and_then(|anchor| {
                Some(ChainTail {
                    sequence_index: anchor.sequence_index.checked_sub(1)?,
                    hash: anchor.previous_hash,
                    timestamp: DateTime::<Utc>::MIN_UTC,
                })
            });
        }
        if let Some(tail) = &tail {
            debug!(
                chain_id = %chain_id,
                sequence_index = tail.sequence_index,
                "loaded chain tail from store"
            );
            self.tails.put(chain_id, tail.clone());
        }
        Ok(tail)
    }
}

fn validate(request: &AppendRequest) -> ChronicleResult<()> {
    for (field, value) in [
        ("chain_id", &request.chain_id),
        ("initiator", &request.initiator),
        ("event_type", &request.event_type),
    ] {
        if value.trim().is_empty() {
            return Err(ChronicleError::validation(format!("{} must not be empty", field)));
        }
    }
    Ok(())
}

/// Stored timestamps carry millisecond precision.
fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
