//! Segment logic shared by every store: chain directory naming, the
//! rotation decision, and the record codec.
//!
//! Record format: one compact JSON `AuditEvent` per line, `\n`-terminated.
//! A line is structurally valid when it parses as an `AuditEvent`; anything
//! else is reported as a `CorruptRecord`.  The final line of a segment is
//! "torn" when the file does not end in `\n`, which is what an interrupted
//! write leaves behind.

use chrono::NaiveDate;

use chronicle_contracts::{
    error::{ChronicleError, ChronicleResult},
    event::AuditEvent,
    segment::{CorruptRecord, SegmentEntry, SegmentId, SegmentRead},
};

// ── Chain directory naming ────────────────────────────────────────────────────

/// Directory name for a chain.
///
/// Chain ids made only of `[A-Za-z0-9_.-]` (and not starting with `.`) are
/// used verbatim; anything else becomes `~` followed by the hex of its
/// UTF-8 bytes.  The mapping is reversible with `decode_chain_dir`.
pub fn encode_chain_dir(chain_id: &str) -> String {
    let plain = !chain_id.is_empty()
        && !chain_id.starts_with('.')
        && chain_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    if plain {
        chain_id.to_string()
    } else {
        format!("~{}", hex::encode(chain_id.as_bytes()))
    }
}

/// Inverse of `encode_chain_dir`.  `None` for names it could not produce.
pub fn decode_chain_dir(name: &str) -> Option<String> {
    match name.strip_prefix('~') {
        Some(encoded) => {
            let chain_id = String::from_utf8(hex::decode(encoded).ok()?).ok()?;
            // One directory per chain: `~6331` is not another name for `c1`.
            (encode_chain_dir(&chain_id) == name).then_some(chain_id)
        }
        None if encode_chain_dir(name) == name => Some(name.to_string()),
        None => None,
    }
}

// ── Rotation ──────────────────────────────────────────────────────────────────

/// What a store knows about a chain's newest segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActiveSegment {
    pub(crate) id: SegmentId,
    pub(crate) size: u64,
    /// False when the segment does not end in `\n`.
    pub(crate) clean_tail: bool,
}

/// Choose the segment a record of `record_len` bytes dated `event_date`
/// goes into.
///
/// - no segment yet → part 0 of the event's date
/// - later date → part 0 of the new date
/// - same date, clean tail, fits → the active segment
/// - otherwise → the next part
///
/// An empty active segment always accepts the record, so a single record
/// larger than `max_bytes` still lands somewhere.  Segments never go
/// backwards: an event dated before the active segment joins a new part of
/// the active date.
pub(crate) fn next_segment(
    active: Option<&ActiveSegment>,
    chain_id: &str,
    event_date: NaiveDate,
    record_len: u64,
    max_bytes: u64,
) -> SegmentId {
    let Some(active) = active else {
        return SegmentId {
            chain_id: chain_id.to_string(),
            date: event_date,
            part: 0,
        };
    };

    if event_date > active.id.date {
        return SegmentId {
            chain_id: chain_id.to_string(),
            date: event_date,
            part: 0,
        };
    }

    let fits = active.size == 0 || active.size + record_len <= max_bytes;
    if event_date == active.id.date && active.clean_tail && fits {
        return active.id.clone();
    }

    SegmentId {
        chain_id: chain_id.to_string(),
        date: active.id.date,
        part: active.id.part + 1,
    }
}

// ── Record codec ──────────────────────────────────────────────────────────────

/// Serialize one event as a newline-terminated record.
pub fn encode_record(event: &AuditEvent) -> ChronicleResult<Vec<u8>> {
    let mut line = serde_json::to_vec(event).map_err(|e| ChronicleError::Encoding {
        reason: format!("failed to serialize event {}: {}", event.sequence_index, e),
    })?;
    line.push(b'\n');
    Ok(line)
}

/// Split a segment's bytes into events and corrupt records, in file order.
pub fn parse_segment(segment: &SegmentId, bytes: &[u8]) -> SegmentRead {
    let ends_clean = bytes.last().map_or(true, |b| *b == b'\n');
    let lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
    let last = lines.len().saturating_sub(1);

    let mut entries = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }
        match serde_json::from_slice::<AuditEvent>(line) {
            Ok(event) => entries.push(SegmentEntry::Event(event)),
            Err(e) => entries.push(SegmentEntry::Corrupt(CorruptRecord {
                segment: segment.clone(),
                line: idx + 1,
                torn: idx == last && !ends_clean,
                reason: e.to_string(),
            })),
        }
    }

    SegmentRead {
        segment: segment.clone(),
        entries,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
