//! Seams between the chain logic and its collaborators.
//!
//! - `SegmentStore`:  durable, rotated, append-only event storage
//! - `TelemetrySink`: fire-and-forget observability port
//! - `Clock`:         source of event timestamps
//!
//! The recorder, verifier, query engine and pruner only ever talk to these
//! traits, so each can be exercised against an in-memory store and a manual
//! clock in isolation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chronicle_contracts::{
    error::ChronicleResult,
    event::AuditEvent,
    segment::{RetentionAnchor, SegmentId, SegmentInfo, SegmentRead},
    telemetry::TelemetryRecord,
};

/// Durable storage for audit chains, split into rotated segments.
///
/// Appends for one chain must be serialized by the caller; the chain
/// recorder holds a per-chain lock across `last_event` and `append`, which
/// also covers the rotation decision.  Reads may run concurrently with
/// appends and observe a shorter prefix, never a half-written record as an
/// event.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Durably append `event` to its chain's active segment.
    ///
    /// Returns only after the record is written (and synced when the store
    /// is configured to sync).  Failures map to `ChronicleError::Persistence`.
    async fn append(&self, event: &AuditEvent) -> ChronicleResult<()>;

    /// The newest well-formed event of a chain, if any.
    async fn last_event(&self, chain_id: &str) -> ChronicleResult<Option<AuditEvent>>;

    /// Every chain that currently has at least one segment.
    async fn chains(&self) -> ChronicleResult<Vec<String>>;

    /// The chain's segments in append order.
    async fn segments(&self, chain_id: &str) -> ChronicleResult<Vec<SegmentInfo>>;

    /// Read and structurally validate one segment.
    async fn read_segment(&self, segment: &SegmentId) -> ChronicleResult<SegmentRead>;

    /// Delete one whole segment.
    async fn delete_segment(&self, segment: &SegmentId) -> ChronicleResult<()>;

    /// Delete every segment and the retention anchor of a chain.
    ///
    /// Returns the number of segments removed.  Callers are responsible for
    /// auditing the clear before calling this.
    async fn clear(&self, chain_id: &str) -> ChronicleResult<u64>;

    /// The chain's retention anchor, if it has been pruned.
    async fn read_anchor(&self, chain_id: &str) -> ChronicleResult<Option<RetentionAnchor>>;

    /// Replace the chain's retention anchor.
    async fn write_anchor(&self, chain_id: &str, anchor: &RetentionAnchor) -> ChronicleResult<()>;

    /// Read every segment of a chain, in order.
    async fn read_chain(&self, chain_id: &str) -> ChronicleResult<Vec<SegmentRead>> {
        let mut reads = Vec::new();
        for info in self.segments(chain_id).await? {
            reads.push(self.read_segment(&info.id).await?);
        }
        Ok(reads)
    }
}

/// Observability port.
///
/// `emit` must not block and cannot fail: telemetry never affects the
/// outcome of an audit operation.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, record: TelemetryRecord);
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
