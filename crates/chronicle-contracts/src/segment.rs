//! Segment identity and read results.
//!
//! A segment holds a contiguous run of one chain's events.  Its identity is
//! the chain plus a rotation key: the UTC calendar date of the events it
//! holds and a part number that increments when a day's segment rotates.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::event::AuditEvent;

/// Identity of one segment.  Orders by chain, then date, then part, which
/// is also append order within a chain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId {
    /// The chain the segment belongs to.
    pub chain_id: String,
    /// UTC date shared by every event in the segment.
    pub date: NaiveDate,
    /// Rotation counter within `date`, starting at 0.
    pub part: u32,
}

impl SegmentId {
    /// Segment file name: `YYYYMMDD-NNNN.jsonl`.
    pub fn file_name(&self) -> String {
        format!("{}-{:04}.jsonl", self.date.format("%Y%m%d"), self.part)
    }

    /// Parse a file name produced by `file_name`.
    pub fn parse_file_name(chain_id: &str, name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".jsonl")?;
        let (date, part) = stem.split_once('-')?;
        if date.len() != 8 || part.is_empty() {
            return None;
        }
        let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
        let part = part.parse().ok()?;
        Some(Self {
            chain_id: chain_id.to_string(),
            date,
            part,
        })
    }

    /// The last instant covered by this segment's date.
    pub fn window_end(&self) -> DateTime<Utc> {
        let next = self.date.succ_opt().unwrap_or(self.date);
        next.and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            - chrono::Duration::milliseconds(1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chain_id, self.file_name())
    }
}

/// Metadata about a stored segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub id: SegmentId,
    /// Bytes currently stored, including any torn tail.
    pub size_bytes: u64,
}

/// A record that failed structural validation on read.
///
/// This is the `CorruptRecordWarning` signal: surfaced to operators, never
/// propagated as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptRecord {
    /// Segment the record was read from.
    pub segment: SegmentId,
    /// 1-based line number inside the segment.
    pub line: usize,
    /// True when this is the final line and it has no terminating newline,
    /// i.e. a write that never completed.
    pub torn: bool,
    /// Why the record was rejected.
    pub reason: String,
}

/// One line of a segment, in file order.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEntry {
    Event(AuditEvent),
    Corrupt(CorruptRecord),
}

/// Everything read from one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRead {
    pub segment: SegmentId,
    pub entries: Vec<SegmentEntry>,
}

impl SegmentRead {
    /// Well-formed events, in order.
    pub fn events(&self) -> impl Iterator<Item = &AuditEvent> {
        self.entries.iter().filter_map(|e| match e {
            SegmentEntry::Event(event) => Some(event),
            SegmentEntry::Corrupt(_) => None,
        })
    }

    /// Records that failed to parse.
    pub fn warnings(&self) -> impl Iterator<Item = &CorruptRecord> {
        self.entries.iter().filter_map(|e| match e {
            SegmentEntry::Corrupt(record) => Some(record),
            SegmentEntry::Event(_) => None,
        })
    }

    /// Consume the read, keeping only well-formed events.
    pub fn into_events(self) -> Vec<AuditEvent> {
        self.entries
            .into_iter()
            .filter_map(|e| match e {
                SegmentEntry::Event(event) => Some(event),
                SegmentEntry::Corrupt(_) => None,
            })
            .collect()
    }
}

/// Where the retained part of a pruned chain begins.
///
/// Written when retention deletes a chain's oldest segments so that
/// verification can start from the first retained event instead of genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionAnchor {
    /// Index the first retained event must carry.
    pub sequence_index: u64,
    /// Hash the first retained event must link to.
    pub previous_hash: String,
    /// When the anchor was written.
    pub pruned_at: DateTime<Utc>,
}
