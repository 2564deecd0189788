//! Chain verification results.
//!
//! A broken chain is an expected, actionable outcome, so the verifier
//! returns it as data.  `into_result` converts it into an error for callers
//! that want to fail closed.

use serde::{Deserialize, Serialize};

use crate::{
    error::{ChronicleError, ChronicleResult},
    segment::CorruptRecord,
};

/// Outcome of replaying one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub chain_id: String,

    /// True only if every event passed the sequence, hash and link checks.
    pub valid: bool,

    /// Index of the first failing event.  `None` when valid.
    pub broken_at_index: Option<u64>,

    /// Why the chain broke.  `None` when valid.
    pub reason: Option<String>,

    /// Events that passed every check before the first failure.
    pub events_checked: u64,

    /// Every well-formed event seen, including those after a failure.
    pub total_events: u64,

    /// Index verification started from: 0, or the retention anchor.
    pub first_index: u64,

    /// Hash of the last event that passed, if any.
    pub terminal_hash: Option<String>,

    /// Torn records skipped during the scan.
    pub warnings: Vec<CorruptRecord>,
}

impl VerificationResult {
    /// Convert a broken result into `ChronicleError::IntegrityViolation`.
    pub fn into_result(self) -> ChronicleResult<Self> {
        if self.valid {
            return Ok(self);
        }
        Err(ChronicleError::IntegrityViolation {
            chain_id: self.chain_id,
            index: self.broken_at_index.unwrap_or(self.first_index),
            reason: self.reason.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}
