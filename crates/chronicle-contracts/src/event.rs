//! Audit event types.
//!
//! `AuditEvent` is one link in a chain: it carries its position
//! (`sequence_index`), the hash of its predecessor, and its own SHA-256 hash
//! over every other field.  `AppendRequest` is what a caller hands to the
//! recorder; everything else on the event is derived.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::payload::AuditPayload;

/// Reserved initiator for actions the trail performs on its own behalf.
pub const SYSTEM_INITIATOR: &str = "system";

/// A single, immutable entry in a hash-linked audit chain.
///
/// Serialized field names follow the persisted record format: one camelCase
/// JSON object per line.  Modifying any field breaks `hash`, and modifying
/// `hash` breaks the successor's `previous_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// The chain this event belongs to.
    pub chain_id: String,

    /// 0-based position in the chain, assigned by the recorder.
    pub sequence_index: u64,

    /// The actor that caused the event, or `SYSTEM_INITIATOR`.
    pub initiator: String,

    /// Action tag, e.g. `ROLE_GRANTED`.
    pub event_type: String,

    /// Event-specific detail.  Opaque to the chain logic; only its canonical
    /// bytes participate in hashing.
    pub payload: Map<String, Value>,

    /// Creation time (UTC), non-decreasing within a chain.
    pub timestamp: DateTime<Utc>,

    /// Correlation id for cross-system tracing.
    pub trace_id: String,

    /// `hash` of the preceding event, or `GENESIS_HASH` at index 0.
    pub previous_hash: String,

    /// Lowercase hex SHA-256 of the canonical form of every other field.
    pub hash: String,
}

impl AuditEvent {
    /// The sentinel `previous_hash` of the first event in every chain.
    ///
    /// 64 hex zeros, which never occurs as the digest of real data.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    /// True when this event opens its chain.
    pub fn is_genesis(&self) -> bool {
        self.sequence_index == 0 && self.previous_hash == Self::GENESIS_HASH
    }

    /// The logical fields covered by `hash`, as a JSON object.
    ///
    /// This is everything except `hash` itself.  The timestamp is rendered
    /// from its value (RFC 3339, `Z` suffix, shortest exact sub-second
    /// precision), never from whatever string it was parsed from.
    pub fn hashable_fields(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("chainId".to_string(), Value::String(self.chain_id.clone()));
        fields.insert("sequenceIndex".to_string(), Value::from(self.sequence_index));
        fields.insert("initiator".to_string(), Value::String(self.initiator.clone()));
        fields.insert("eventType".to_string(), Value::String(self.event_type.clone()));
        fields.insert("payload".to_string(), Value::Object(self.payload.clone()));
        fields.insert(
            "timestamp".to_string(),
            Value::String(
                self.timestamp
                    .to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            ),
        );
        fields.insert("traceId".to_string(), Value::String(self.trace_id.clone()));
        fields.insert(
            "previousHash".to_string(),
            Value::String(self.previous_hash.clone()),
        );
        Value::Object(fields)
    }

    /// Interpret the payload according to `event_type`.
    ///
    /// Falls back to `AuditPayload::Other` when the type is unknown or the
    /// object does not match the known schema.
    pub fn typed_payload(&self) -> AuditPayload {
        AuditPayload::from_parts(&self.event_type, &self.payload)
    }

    /// Short hash prefix for log lines and telemetry.
    pub fn hash_prefix(&self) -> &str {
        short_hash(&self.hash)
    }
}

/// The first twelve characters of `hash`.
///
/// Stored hashes are read back from disk and may hold anything, so this
/// cuts on a character boundary rather than a byte offset.
pub fn short_hash(hash: &str) -> &str {
    hash.char_indices().nth(12).map_or(hash, |(end, _)| &hash[..end])
}

/// A caller's request to append one event.
///
/// `sequence_index`, `timestamp`, `previous_hash` and `hash` are never
/// caller-supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    /// Target chain.
    pub chain_id: String,
    /// The acting user or `SYSTEM_INITIATOR`.
    pub initiator: String,
    /// Action tag.
    pub event_type: String,
    /// Must be a JSON object.
    pub payload: Value,
    /// Correlation id; the recorder generates a UUID when absent.
    pub trace_id: Option<String>,
}

impl AppendRequest {
    /// Build a request with an empty payload and no trace id.
    pub fn new(
        chain_id: impl Into<String>,
        initiator: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            initiator: initiator.into(),
            event_type: event_type.into(),
            payload: Value::Object(Map::new()),
            trace_id: None,
        }
    }

    /// Replace the payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Attach a caller-supplied trace id.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// Generate a fresh trace id.
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
