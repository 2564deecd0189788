//! `AuditTrail`: the one entry point applications use.
//!
//! Wires a recorder, verifier, query engine and pruner around one segment
//! store, and adds the operations that span chains: audited clears, audited
//! retention and tombstones.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use chronicle_contracts::{
    error::{ChronicleError, ChronicleResult},
    event::{AppendRequest, AuditEvent, SYSTEM_INITIATOR},
    payload::{AuditPayload, LogsClearedDetails, RetentionPrunedDetails, TombstoneDetails},
    query::{AuditQuery, AuditSummary, QueryPage},
    report::{ClearReport, PruneReport},
    verify::VerificationResult,
};
use chronicle_core::{
    clock::SystemClock,
    config::{ChainConfig, ChronicleConfig},
    traits::{Clock, SegmentStore, TelemetrySink},
};
use chronicle_store::{FileSegmentStore, InMemorySegmentStore};

use crate::query::QueryEngine;
use crate::recorder::ChainRecorder;
use crate::retention::RetentionPruner;
use crate::telemetry::sink_for;
use crate::verifier::ChainVerifier;

/// Tamper-evident audit trail over a set of chains.
pub struct AuditTrail {
    recorder: Arc<ChainRecorder>,
    verifier: ChainVerifier,
    query: QueryEngine,
    pruner: RetentionPruner,
    chains: ChainConfig,
    retention_days: Option<u32>,
}

impl AuditTrail {
    pub fn new(
        store: Arc<dyn SegmentStore>,
        telemetry: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
        chains: ChainConfig,
    ) -> Self {
        let recorder = Arc::new(ChainRecorder::new(
            store.clone(),
            telemetry.clone(),
            clock.clone(),
        ));
        Self {
            verifier: ChainVerifier::new(store.clone(), telemetry, clock.clone()),
            query: QueryEngine::new(store),
            pruner: RetentionPruner::new(recorder.clone(), clock),
            recorder,
            chains,
            retention_days: None,
        }
    }

    /// Open the file store named by `config` with the system clock.
    pub async fn from_config(config: &ChronicleConfig) -> ChronicleResult<Self> {
        config.validate()?;
        let store = FileSegmentStore::open(&config.store).await?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// A volatile trail with `config`'s chain, retention and telemetry
    /// settings.
    pub fn in_memory(config: &ChronicleConfig) -> Self {
        let store = InMemorySegmentStore::new(config.store.max_segment_bytes);
        Self::with_store(Arc::new(store), config)
    }

    fn with_store(store: Arc<dyn SegmentStore>, config: &ChronicleConfig) -> Self {
        let mut trail = Self::new(
            store,
            sink_for(config.telemetry.sink),
            Arc::new(SystemClock),
            config.chain.clone(),
        );
        trail.retention_days = config.retention.days;
        trail
    }

    pub fn default_chain(&self) -> &str {
        &self.chains.default_chain
    }

    pub fn admin_chain(&self) -> &str {
        &self.chains.admin_chain
    }

    /// Retention window from configuration, if any.
    pub fn retention_days(&self) -> Option<u32> {
        self.retention_days
    }

    pub fn recorder(&self) -> &Arc<ChainRecorder> {
        &self.recorder
    }

    // ── Recording ─────────────────────────────────────────────────────────────

    /// Record to the default chain.
    pub async fn record_audit_event(
        &self,
        initiator: &str,
        event_type: &str,
        payload: Value,
    ) -> ChronicleResult<AuditEvent> {
        self.record_to(&self.chains.default_chain, initiator, event_type, payload)
            .await
    }

    /// Record to a named chain.
    pub async fn record_to(
        &self,
        chain_id: &str,
        initiator: &str,
        event_type: &str,
        payload: Value,
    ) -> ChronicleResult<AuditEvent> {
        self.record(AppendRequest::new(chain_id, initiator, event_type).with_payload(payload))
            .await
    }

    /// Record a fully specified request, trace id included.
    pub async fn record(&self, request: AppendRequest) -> ChronicleResult<AuditEvent> {
        self.recorder.append(request).await
    }

    /// Record a typed payload to a named chain.
    pub async fn record_typed(
        &self,
        chain_id: &str,
        initiator: &str,
        payload: &AuditPayload,
    ) -> ChronicleResult<AuditEvent> {
        self.recorder.append_typed(chain_id, initiator, payload).await
    }

    // ── Reading ───────────────────────────────────────────────────────────────

    pub async fn verify_audit_chain(&self, chain_id: &str) -> ChronicleResult<VerificationResult> {
        self.verifier.verify(chain_id).await
    }

    /// Verify every stored chain, in chain order.
    pub async fn verify_all(&self) -> ChronicleResult<Vec<VerificationResult>> {
        let mut results = Vec::new();
        for chain_id in self.recorder.store().chains().await? {
            results.push(self.verifier.verify(&chain_id).await?);
        }
        Ok(results)
    }

    pub async fn query_audit_events(&self, query: &AuditQuery) -> ChronicleResult<QueryPage> {
        self.query.query(query).await
    }

    pub async fn summary(&self) -> ChronicleResult<AuditSummary> {
        self.query.summary().await
    }

    // ── Destructive operations ────────────────────────────────────────────────

    /// Prune expired segments from every chain, then record one
    /// `RETENTION_PRUNED` event per pruned chain on the admin chain.
    pub async fn prune(&self, older_than_days: u32) -> ChronicleResult<PruneReport> {
        let report = self.pruner.prune(older_than_days).await?;
        for chain in &report.chains {
            let details = RetentionPrunedDetails {
                target: chain.chain_id.clone(),
                segments_deleted: chain.segments_deleted,
                events_deleted: chain.events_deleted,
                older_than_days,
                anchor_sequence: chain.anchor_sequence,
            };
            self.recorder
                .append_typed(
                    &self.chains.admin_chain,
                    SYSTEM_INITIATOR,
                    &AuditPayload::RetentionPruned(details),
                )
                .await?;
        }
        Ok(report)
    }

    /// Delete every segment of `chain_id`.
    ///
    /// A `LOGS_CLEARED` event naming `requested_by`, the chain, its event
    /// count and its terminal hash is recorded on the admin chain before
    /// anything is deleted.  If that record cannot be written nothing is
    /// deleted.  The admin chain itself cannot be cleared.
    pub async fn clear(&self, chain_id: &str, requested_by: &str) -> ChronicleResult<ClearReport> {
        if chain_id == self.chains.admin_chain {
            return Err(ChronicleError::validation(format!(
                "the admin chain '{}' cannot be cleared",
                chain_id
            )));
        }
        if requested_by.trim().is_empty() {
            return Err(ChronicleError::validation("requested_by must not be empty"));
        }

        let _guard = self.recorder.lock_chain(chain_id).await;
        let store = self.recorder.store();

        let events: Vec<AuditEvent> = store
            .read_chain(chain_id)
            .await?
            .into_iter()
            .flat_map(|read| read.into_events())
            .collect();
        let details = LogsClearedDetails {
            target: chain_id.to_string(),
            events_cleared: Some(events.len() as u64),
            terminal_hash: events.last().map(|e| e.hash.clone()),
        };
        let audit = self
            .recorder
            .append_typed(
                &self.chains.admin_chain,
                requested_by,
                &AuditPayload::LogsCleared(details),
            )
            .await?;

        let segments_deleted = store.clear(chain_id).await?;
        self.recorder.tail_cache().invalidate(chain_id);

        info!(
            chain_id = %chain_id,
            requested_by = %requested_by,
            segments = segments_deleted,
            events = events.len(),
            audit_sequence = audit.sequence_index,
            "audit chain cleared"
        );
        Ok(ClearReport {
            chain_id: chain_id.to_string(),
            segments_deleted,
            events_deleted: events.len() as u64,
            audit_sequence: audit.sequence_index,
        })
    }

    /// Mark an earlier event as withdrawn by appending a
    /// `RECORD_TOMBSTONED` event to the same chain.  The target stays
    /// stored and verifiable.
    pub async fn tombstone(
        &self,
        chain_id: &str,
        initiator: &str,
        target_sequence: u64,
        reason: &str,
    ) -> ChronicleResult<AuditEvent> {
        if reason.trim().is_empty() {
            return Err(ChronicleError::validation("tombstone reason must not be empty"));
        }
        let last = self.recorder.store().last_event(chain_id).await?;
        match last {
            Some(last) if target_sequence <= last.sequence_index => {}
            _ => {
                return Err(ChronicleError::validation(format!(
                    "chain '{}' has no event at index {}",
                    chain_id, target_sequence
                )))
            }
        }
        let details = TombstoneDetails {
            target_sequence,
            reason: reason.to_string(),
        };
        self.recorder
            .append_typed(chain_id, initiator, &AuditPayload::RecordTombstoned(details))
            .await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use chronicle_contracts::payload::event_types;

    use super::*;

    fn trail() -> AuditTrail {
        AuditTrail::in_memory(&ChronicleConfig::default())
    }

    #[tokio::test]
    async fn default_chain_receives_untargeted_events() {
        let trail = trail();
        let event = trail
            .record_audit_event("u1", "LOGIN", json!({}))
            .await
            .unwrap();
        assert_eq!(event.chain_id, "global");
        assert!(trail.verify_audit_chain("global").await.unwrap().valid);
    }

    #[tokio::test]
    async fn clear_is_audited_on_the_admin_chain() {
        let trail = trail();
        trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();
        let last = trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();

        let report = trail.clear("c1", "admin").await.unwrap();
        assert_eq!(report.events_deleted, 2);
        assert_eq!(report.segments_deleted, 1);

        let admin = trail
            .query_audit_events(&AuditQuery::default().chain("_admin"))
            .await
            .unwrap();
        assert_eq!(admin.total, 1);
        let record = &admin.items[0];
        assert_eq!(record.initiator, "admin");
        assert_eq!(
            record.typed_payload(),
            AuditPayload::LogsCleared(LogsClearedDetails {
                target: "c1".to_string(),
                events_cleared: Some(2),
                terminal_hash: Some(last.hash),
            })
        );

        let restarted = trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();
        assert_eq!(restarted.sequence_index, 0, "a cleared chain starts again at genesis");
    }

    #[tokio::test]
    async fn admin_chain_cannot_be_cleared() {
        let trail = trail();
        assert!(matches!(
            trail.clear("_admin", "root").await,
            Err(ChronicleError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn tombstone_appends_and_requires_existing_target() {
        let trail = trail();
        trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();

        let tombstone = trail.tombstone("c1", "admin", 0, "entered in error").await.unwrap();
        assert_eq!(tombstone.event_type, event_types::RECORD_TOMBSTONED);
        assert_eq!(tombstone.sequence_index, 1);
        assert!(trail.verify_audit_chain("c1").await.unwrap().valid);

        assert!(matches!(
            trail.tombstone("c1", "admin", 9, "missing").await,
            Err(ChronicleError::Validation { .. })
        ));
        assert!(matches!(
            trail.tombstone("c1", "admin", 0, " ").await,
            Err(ChronicleError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn verify_all_covers_every_chain() {
        let trail = trail();
        trail.record_to("a", "u1", "LOGIN", json!({})).await.unwrap();
        trail.record_to("b", "u1", "LOGIN", json!({})).await.unwrap();
        let results = trail.verify_all().await.unwrap();
        let chains: Vec<_> = results.iter().map(|r| r.chain_id.as_str()).collect();
        assert_eq!(chains, vec!["a", "b"]);
        assert!(results.iter().all(|r| r.valid));
    }
}
