//! Reports returned by lifecycle operations.

use serde::{Deserialize, Serialize};

/// Per-chain retention outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPruneReport {
    pub chain_id: String,
    pub segments_deleted: u64,
    pub events_deleted: u64,
    /// Index of the first retained event, when any remain.
    pub anchor_sequence: Option<u64>,
}

/// Outcome of one retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub segments_deleted: u64,
    pub events_deleted: u64,
    /// Chains that lost at least one segment.
    pub chains: Vec<ChainPruneReport>,
}

/// Outcome of clearing a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    pub chain_id: String,
    pub segments_deleted: u64,
    pub events_deleted: u64,
    /// Index of the `LOGS_CLEARED` event in the admin chain.
    pub audit_sequence: u64,
}
