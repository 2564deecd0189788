//! Hash-chain primitives: hashing and link checks.
//!
//! Hash input: the canonical JSON (see `canonical`) of every event field
//! except `hash`:
//!
//!   chainId, sequenceIndex, initiator, eventType, payload, timestamp,
//!   traceId, previousHash
//!
//! Digest: SHA-256, rendered as 64 lowercase hex characters.

use sha2::{Digest, Sha256};

use chronicle_contracts::{
    error::ChronicleResult,
    event::{short_hash, AuditEvent},
};

use crate::canonical::canonicalize;

/// SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(digest(bytes))
}

/// Compute the hash an event should carry.
///
/// Ignores the event's current `hash`, so this is both how the recorder
/// seals an event and how the verifier re-derives it.
pub fn hash_event(event: &AuditEvent) -> ChronicleResult<String> {
    let canonical = canonicalize(&event.hashable_fields())?;
    Ok(digest_hex(&canonical))
}

/// Why a single event fails to extend a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFailure {
    /// `sequence_index` is not the next expected index: a gap, duplicate or
    /// reorder.
    Sequence { expected: u64, found: u64 },
    /// The stored hash does not match the recomputed one: content altered.
    Hash { stored: String, recomputed: String },
    /// The payload cannot be canonicalized any more.
    Unhashable { reason: String },
    /// `previous_hash` does not point at the preceding event.
    Link { expected: String, found: String },
}

impl LinkFailure {
    /// Human-readable reason.
    pub fn describe(&self) -> String {
        match self {
            Self::Sequence { expected, found } => format!(
                "sequence gap: expected index {}, found {} (event inserted, removed or reordered)",
                expected, found
            ),
            Self::Hash { stored, recomputed } => format!(
                "hash mismatch: stored {}, recomputed {} (stored content was altered)",
                short_hash(stored),
                short_hash(recomputed)
            ),
            Self::Unhashable { reason } => format!("event cannot be re-hashed: {}", reason),
            Self::Link { expected, found } => format!(
                "link mismatch: previousHash {} does not match preceding hash {} (event inserted, removed or reordered)",
                short_hash(found),
                short_hash(expected)
            ),
        }
    }
}

/// Check that `event` is a valid successor.
///
/// Checks run in order: sequence, hash recompute, previous-hash link.
pub fn check_link(
    event: &AuditEvent,
    expected_index: u64,
    expected_previous_hash: &str,
) -> Result<(), LinkFailure> {
    if event.sequence_index != expected_index {
        return Err(LinkFailure::Sequence {
            expected: expected_index,
            found: event.sequence_index,
        });
    }

    let recomputed = hash_event(event).map_err(|e| LinkFailure::Unhashable {
        reason: e.to_string(),
    })?;
    if recomputed != event.hash {
        return Err(LinkFailure::Hash {
            stored: event.hash.clone(),
            recomputed,
        });
    }

    if event.previous_hash != expected_previous_hash {
        return Err(LinkFailure::Link {
            expected: expected_previous_hash.to_string(),
            found: event.previous_hash.clone(),
        });
    }

    Ok(())
}

/// Verify an in-memory run of events starting at genesis.
///
/// Returns `true` when every event passes `check_link`.  An empty slice is
/// valid.
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    let mut expected_prev = AuditEvent::GENESIS_HASH.to_string();
    for (index, event) in events.iter().enumerate() {
        if check_link(event, index as u64, &expected_prev).is_err() {
            return false;
        }
        expected_prev = event.hash.clone();
    }
    true
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Map};

    use super::*;

    fn sealed(index: u64, previous_hash: &str, payload: serde_json::Value) -> AuditEvent {
        let mut event = AuditEvent {
            chain_id: "c1".to_string(),
            sequence_index: index,
            initiator: "u1".to_string(),
            event_type: "LOGIN".to_string(),
            payload: payload.as_object().cloned().unwrap_or_else(Map::new),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, index as u32).unwrap(),
            trace_id: "trace".to_string(),
            previous_hash: previous_hash.to_string(),
            hash: String::new(),
        };
        event.hash = hash_event(&event).unwrap();
        event
    }

    fn chain(n: u64) -> Vec<AuditEvent> {
        let mut events: Vec<AuditEvent> = Vec::new();
        for i in 0..n {
            let prev = events
                .last()
                .map(|e| e.hash.clone())
                .unwrap_or_else(|| AuditEvent::GENESIS_HASH.to_string());
            events.push(sealed(i, &prev, json!({ "n": i })));
        }
        events
    }

    #[test]
    fn digest_matches_known_sha256() {
        assert_eq!(
            digest_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hash_is_lowercase_hex_and_ignores_stored_hash() {
        let mut event = sealed(0, AuditEvent::GENESIS_HASH, json!({}));
        let original = event.hash.clone();
        assert_eq!(original.len(), 64);
        assert!(original.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        event.hash = "garbage".to_string();
        assert_eq!(hash_event(&event).unwrap(), original);
    }

    #[test]
    fn every_field_contributes_to_the_hash() {
        let base = sealed(1, &"ab".repeat(32), json!({ "size": 10 }));
        let variants: Vec<Box<dyn Fn(&mut AuditEvent)>> = vec![
            Box::new(|e| e.chain_id.push('x')),
            Box::new(|e| e.sequence_index += 1),
            Box::new(|e| e.initiator.push('x')),
            Box::new(|e| e.event_type.push('x')),
            Box::new(|e| {
                e.payload.insert("size".to_string(), json!(999));
            }),
            Box::new(|e| e.timestamp += chrono::Duration::milliseconds(1)),
            Box::new(|e| e.trace_id.push('x')),
            Box::new(|e| e.previous_hash = "cd".repeat(32)),
        ];
        for (i, mutate) in variants.iter().enumerate() {
            let mut changed = base.clone();
            mutate(&mut changed);
            assert_ne!(
                hash_event(&changed).unwrap(),
                base.hash,
                "mutation #{i} must change the hash"
            );
        }
    }

    #[test]
    fn check_link_reports_each_failure_kind() {
        let events = chain(2);

        assert_eq!(check_link(&events[1], 1, &events[0].hash), Ok(()));

        assert!(matches!(
            check_link(&events[1], 2, &events[0].hash),
            Err(LinkFailure::Sequence { expected: 2, found: 1 })
        ));

        let mut altered = events[1].clone();
        altered.payload.insert("n".to_string(), json!(42));
        assert!(matches!(
            check_link(&altered, 1, &events[0].hash),
            Err(LinkFailure::Hash { .. })
        ));

        assert!(matches!(
            check_link(&events[1], 1, AuditEvent::GENESIS_HASH),
            Err(LinkFailure::Link { .. })
        ));
    }

    #[test]
    fn verify_chain_accepts_valid_and_empty_chains() {
        assert!(verify_chain(&[]));
        assert!(verify_chain(&chain(5)));
    }

    #[test]
    fn verify_chain_rejects_removed_event() {
        let mut events = chain(4);
        events.remove(2);
        assert!(!verify_chain(&events));
    }

    #[test]
    fn failure_descriptions_name_the_problem() {
        let msg = LinkFailure::Hash {
            stored: "a".repeat(64),
            recomputed: "b".repeat(64),
        }
        .describe();
        assert!(msg.contains("hash mismatch"));
        assert!(msg.contains("aaaaaaaaaaaa"));
        assert!(!msg.contains(&"a".repeat(13)));
    }

    #[test]
    fn descriptions_survive_non_ascii_hashes() {
        let msg = LinkFailure::Link {
            expected: "b".repeat(64),
            found: format!("a{}", "é".repeat(8)),
        }
        .describe();
        assert!(msg.contains(&format!("a{}", "é".repeat(8))));
    }
}
