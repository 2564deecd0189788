//! Concurrency, storage faults, retention and queries through the facade.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use tokio::task::JoinSet;

use chronicle_audit::{AuditTrail, ChannelTelemetry, NoopTelemetry};
use chronicle_contracts::{
    error::{ChronicleError, ChronicleResult},
    event::AuditEvent,
    payload::{event_types, AuditPayload},
    query::AuditQuery,
    segment::{RetentionAnchor, SegmentId, SegmentInfo, SegmentRead},
    telemetry::TelemetryOutcome,
};
use chronicle_core::{
    clock::ManualClock,
    config::ChainConfig,
    traits::{Clock, SegmentStore},
};
use chronicle_store::InMemorySegmentStore;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, d, 8, 0, 0).unwrap()
}

fn trail_over(store: Arc<dyn SegmentStore>, clock: Arc<dyn Clock>) -> AuditTrail {
    AuditTrail::new(store, Arc::new(NoopTelemetry), clock, ChainConfig::default())
}

/// Wraps a memory store and fails or slows writes on demand.
struct FlakyStore {
    inner: InMemorySegmentStore,
    failing: AtomicBool,
    failing_anchor: AtomicBool,
    stall_ms: AtomicU64,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemorySegmentStore::default(),
            failing: AtomicBool::new(false),
            failing_anchor: AtomicBool::new(false),
            stall_ms: AtomicU64::new(0),
        }
    }

    fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn fail_anchor(&self, on: bool) {
        self.failing_anchor.store(on, Ordering::SeqCst);
    }

    /// Delay every append by `ms` after the record is stored.
    fn stall_after_write(&self, ms: u64) {
        self.stall_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl SegmentStore for FlakyStore {
    async fn append(&self, event: &AuditEvent) -> ChronicleResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChronicleError::persistence("disk unavailable"));
        }
        self.inner.append(event).await?;
        let stall = self.stall_ms.load(Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(StdDuration::from_millis(stall)).await;
        }
        Ok(())
    }

    async fn last_event(&self, chain_id: &str) -> ChronicleResult<Option<AuditEvent>> {
        self.inner.last_event(chain_id).await
    }

    async fn chains(&self) -> ChronicleResult<Vec<String>> {
        self.inner.chains().await
    }

    async fn segments(&self, chain_id: &str) -> ChronicleResult<Vec<SegmentInfo>> {
        self.inner.segments(chain_id).await
    }

    async fn read_segment(&self, segment: &SegmentId) -> ChronicleResult<SegmentRead> {
        self.inner.read_segment(segment).await
    }

    async fn delete_segment(&self, segment: &SegmentId) -> ChronicleResult<()> {
        self.inner.delete_segment(segment).await
    }

    async fn clear(&self, chain_id: &str) -> ChronicleResult<u64> {
        self.inner.clear(chain_id).await
    }

    async fn read_anchor(&self, chain_id: &str) -> ChronicleResult<Option<RetentionAnchor>> {
        self.inner.read_anchor(chain_id).await
    }

    async fn write_anchor(&self, chain_id: &str, anchor: &RetentionAnchor) -> ChronicleResult<()> {
        if self.failing_anchor.load(Ordering::SeqCst) {
            return Err(ChronicleError::persistence("anchor file unavailable"));
        }
        self.inner.write_anchor(chain_id, anchor).await
    }
}

// ── Concurrency ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_form_one_gap_free_chain() {
    const N: u64 = 64;
    let trail = Arc::new(AuditTrail::new(
        Arc::new(InMemorySegmentStore::default()),
        Arc::new(NoopTelemetry),
        Arc::new(chronicle_core::clock::SystemClock),
        ChainConfig::default(),
    ));

    let mut tasks = JoinSet::new();
    for i in 0..N {
        let trail = Arc::clone(&trail);
        tasks.spawn(async move {
            trail
                .record_to("hot", &format!("u{}", i % 4), "LOGIN", json!({ "i": i }))
                .await
        });
    }
    let mut indices = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        indices.push(joined.unwrap().unwrap().sequence_index);
    }
    indices.sort_unstable();
    assert_eq!(indices, (0..N).collect::<Vec<_>>());

    let result = trail.verify_audit_chain("hot").await.unwrap();
    assert!(result.valid, "{:?}", result.reason);
    assert_eq!(result.events_checked, N);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_chains_append_in_parallel() {
    let trail = Arc::new(AuditTrail::in_memory(&Default::default()));
    let mut tasks = JoinSet::new();
    for chain in ["a", "b", "c"] {
        for _ in 0..10 {
            let trail = Arc::clone(&trail);
            tasks.spawn(async move { trail.record_to(chain, "u1", "LOGIN", json!({})).await });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }
    for result in trail.verify_all().await.unwrap() {
        assert!(result.valid);
        assert_eq!(result.events_checked, 10, "chain {}", result.chain_id);
    }
}

// ── Storage faults ────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_write_is_reported_and_does_not_advance_the_chain() {
    let store = Arc::new(FlakyStore::new());
    let trail = trail_over(store.clone(), Arc::new(ManualClock::new(day(1))));

    trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();

    store.fail(true);
    let err = trail
        .record_to("c1", "u1", "LOGIN", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ChronicleError::Persistence { .. }));
    assert!(!err.is_caller_fault());
    assert_eq!(
        trail.recorder().tail_cache().get("c1"),
        None,
        "failed write must drop the cached tail"
    );

    store.fail(false);
    let next = trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();
    assert_eq!(next.sequence_index, 1, "the failed append must not consume an index");
    assert!(trail.verify_audit_chain("c1").await.unwrap().valid);
}

#[tokio::test]
async fn abandoned_append_still_lands_and_the_chain_stays_linear() {
    let store = Arc::new(FlakyStore::new());
    let trail = trail_over(store.clone(), Arc::new(ManualClock::new(day(1))));
    trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();

    store.stall_after_write(200);
    let abandoned = tokio::time::timeout(
        StdDuration::from_millis(50),
        trail.record_to("c1", "u1", "LOGIN", json!({})),
    )
    .await;
    assert!(abandoned.is_err(), "the caller must give up before the write returns");
    store.stall_after_write(0);

    let third = trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();
    assert_eq!(third.sequence_index, 2, "the abandoned record still took index 1");

    let result = trail.verify_audit_chain("c1").await.unwrap();
    assert!(result.valid, "{:?}", result.reason);
    assert_eq!(result.events_checked, 3);
}

#[tokio::test]
async fn clear_is_not_performed_when_it_cannot_be_audited() {
    let store = Arc::new(FlakyStore::new());
    let trail = trail_over(store.clone(), Arc::new(ManualClock::new(day(1))));
    trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();

    store.fail(true);
    assert!(trail.clear("c1", "admin").await.is_err());
    store.fail(false);

    let result = trail.verify_audit_chain("c1").await.unwrap();
    assert_eq!(result.total_events, 1, "nothing may be deleted without an audit record");
}

// ── Telemetry ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn telemetry_sees_appends_and_violations() {
    let store = Arc::new(InMemorySegmentStore::default());
    let (sink, mut rx) = ChannelTelemetry::bounded(16);
    let trail = AuditTrail::new(
        store,
        Arc::new(sink),
        Arc::new(ManualClock::new(day(1))),
        ChainConfig::default(),
    );

    let event = trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();
    trail.verify_audit_chain("c1").await.unwrap();

    let appended = rx.recv().await.unwrap();
    assert_eq!(appended.chain_id, "c1");
    assert_eq!(appended.event_type, "LOGIN");
    assert_eq!(appended.trace_id, event.trace_id);
    assert!(matches!(appended.outcome, TelemetryOutcome::Appended { sequence_index: 0, .. }));

    let verified = rx.recv().await.unwrap();
    assert_eq!(verified.outcome, TelemetryOutcome::Verified { events: 1 });
}

// ── Retention ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pruning_keeps_recent_events_and_is_audited() {
    let clock = Arc::new(ManualClock::new(day(1)));
    let trail = trail_over(Arc::new(InMemorySegmentStore::default()), clock.clone());

    for d in [1, 2, 3, 10, 11] {
        clock.set(day(d));
        trail.record_to("c1", "u1", "LOGIN", json!({ "day": d })).await.unwrap();
        trail.record_to("c2", "u2", "LOGIN", json!({ "day": d })).await.unwrap();
    }
    clock.set(day(12));

    let report = trail.prune(5).await.unwrap();
    assert_eq!(report.segments_deleted, 6);
    assert_eq!(report.events_deleted, 6);
    assert_eq!(report.chains.len(), 2);

    let cutoff = day(12) - Duration::days(5);
    let remaining = trail
        .query_audit_events(&AuditQuery::default().event_type("LOGIN"))
        .await
        .unwrap();
    assert_eq!(remaining.total, 4);
    assert!(remaining.items.iter().all(|e| e.timestamp >= cutoff));

    for chain in ["c1", "c2"] {
        let result = trail.verify_audit_chain(chain).await.unwrap();
        assert!(result.valid, "{chain}: {:?}", result.reason);
        assert_eq!(result.first_index, 3);
    }

    let audit = trail
        .query_audit_events(&AuditQuery::default().chain("_admin").oldest_first())
        .await
        .unwrap();
    assert_eq!(audit.total, 2);
    for event in &audit.items {
        assert_eq!(event.event_type, event_types::RETENTION_PRUNED);
        match event.typed_payload() {
            AuditPayload::RetentionPruned(details) => {
                assert_eq!(details.events_deleted, 3);
                assert_eq!(details.older_than_days, 5);
                assert_eq!(details.anchor_sequence, Some(3));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}

#[tokio::test]
async fn failed_anchor_write_deletes_nothing() {
    let store = Arc::new(FlakyStore::new());
    let clock = Arc::new(ManualClock::new(day(1)));
    let trail = trail_over(store.clone(), clock.clone());
    for d in [1, 2, 10] {
        clock.set(day(d));
        trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();
    }
    clock.set(day(12));

    store.fail_anchor(true);
    let err = trail.prune(5).await.unwrap_err();
    assert!(matches!(err, ChronicleError::Persistence { .. }));
    assert_eq!(store.segments("c1").await.unwrap().len(), 3);

    let result = trail.verify_audit_chain("c1").await.unwrap();
    assert!(result.valid, "{:?}", result.reason);
    assert_eq!((result.first_index, result.events_checked), (0, 3));

    store.fail_anchor(false);
    let report = trail.prune(5).await.unwrap();
    assert_eq!(report.events_deleted, 2);
    assert!(trail.verify_audit_chain("c1").await.unwrap().valid);
}

// ── Queries ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn initiator_query_spans_chains_and_segments() {
    let clock = Arc::new(ManualClock::new(day(1)));
    let trail = trail_over(Arc::new(InMemorySegmentStore::new(1024)), clock.clone());

    for d in 1..=5 {
        clock.set(day(d));
        for chain in ["c1", "c2"] {
            trail
                .record_to(chain, "u1", "FILE_UPLOAD", json!({ "size": d, "pad": "x".repeat(300) }))
                .await
                .unwrap();
            trail.record_to(chain, "u2", "LOGIN", json!({})).await.unwrap();
        }
    }

    let page = trail
        .query_audit_events(&AuditQuery::default().initiator("u1").limit(3))
        .await
        .unwrap();
    assert_eq!(page.total, 10);
    assert_eq!(page.items.len(), 3);
    assert!(page.items.iter().all(|e| e.initiator == "u1"));
    assert_eq!(page.items[0].timestamp, day(5), "newest first by default");

    let all = trail
        .query_audit_events(&AuditQuery::default().initiator("u1"))
        .await
        .unwrap();
    assert_eq!(all.items.len(), all.total);

    let summary = trail.summary().await.unwrap();
    assert_eq!(summary.total_events, 20);
    assert_eq!(summary.per_initiator.get("u1"), Some(&10));
}

#[tokio::test]
async fn admin_records_can_be_found_by_target() {
    let trail = trail_over(
        Arc::new(InMemorySegmentStore::default()),
        Arc::new(ManualClock::new(day(1))),
    );
    trail.record_to("c1", "u1", "LOGIN", json!({})).await.unwrap();
    trail.record_to("c2", "u1", "LOGIN", json!({})).await.unwrap();
    trail.clear("c1", "admin").await.unwrap();
    trail.clear("c2", "admin").await.unwrap();

    let page = trail
        .query_audit_events(&AuditQuery::default().target("c2"))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].chain_id, "_admin");
    assert_eq!(page.items[0].event_type, event_types::LOGS_CLEARED);
}
