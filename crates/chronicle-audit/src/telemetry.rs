//! Telemetry sinks.
//!
//! Every sink is synchronous and non-blocking: `emit` returns immediately and
//! can never fail the audit operation that produced the record.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chronicle_contracts::telemetry::{TelemetryOutcome, TelemetryRecord};
use chronicle_core::{config::TelemetryKind, traits::TelemetrySink};

/// Emits each record as a structured `tracing` event on target
/// `chronicle::telemetry`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, record: TelemetryRecord) {
        match &record.outcome {
            TelemetryOutcome::Appended {
                sequence_index,
                hash_prefix,
            } => info!(
                target: "chronicle::telemetry",
                trace_id = %record.trace_id,
                chain_id = %record.chain_id,
                event_type = %record.event_type,
                sequence_index,
                hash_prefix = %hash_prefix,
                "appended"
            ),
            TelemetryOutcome::AppendFailed { reason } => warn!(
                target: "chronicle::telemetry",
                trace_id = %record.trace_id,
                chain_id = %record.chain_id,
                event_type = %record.event_type,
                reason = %reason,
                "append failed"
            ),
            TelemetryOutcome::Verified { events } => info!(
                target: "chronicle::telemetry",
                trace_id = %record.trace_id,
                chain_id = %record.chain_id,
                events,
                "verified"
            ),
            TelemetryOutcome::IntegrityViolation { index, reason } => warn!(
                target: "chronicle::telemetry",
                trace_id = %record.trace_id,
                chain_id = %record.chain_id,
                index,
                reason = %reason,
                "integrity violation"
            ),
        }
    }
}

/// Forwards records to a bounded channel.  When the channel is full or
/// closed the record is dropped.
#[derive(Debug, Clone)]
pub struct ChannelTelemetry {
    tx: mpsc::Sender<TelemetryRecord>,
}

impl ChannelTelemetry {
    /// A sink and the receiver that drains it.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<TelemetryRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelTelemetry {
    fn emit(&self, record: TelemetryRecord) {
        if let Err(e) = self.tx.try_send(record) {
            debug!(error = %e, "telemetry record dropped");
        }
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn emit(&self, _record: TelemetryRecord) {}
}

/// The sink selected by configuration.
pub fn sink_for(kind: TelemetryKind) -> std::sync::Arc<dyn TelemetrySink> {
    match kind {
        TelemetryKind::Tracing => std::sync::Arc::new(TracingTelemetry),
        TelemetryKind::None => std::sync::Arc::new(NoopTelemetry),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
