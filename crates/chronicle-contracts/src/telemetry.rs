//! Telemetry records emitted to the observability collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryOutcome {
    /// An event was durably appended.
    Appended { sequence_index: u64, hash_prefix: String },
    /// An append was rejected or failed to persist.
    AppendFailed { reason: String },
    /// A chain verified cleanly.
    Verified { events: u64 },
    /// Verification found a broken link.
    IntegrityViolation { index: u64, reason: String },
}

/// One telemetry message.  Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub trace_id: String,
    pub chain_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: TelemetryOutcome,
}
