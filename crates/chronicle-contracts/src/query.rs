//! Query filters, result pages and summaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::AuditEvent;

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Most recent first: descending `(timestamp, sequence_index)`.
    #[default]
    NewestFirst,
    /// Oldest first.
    OldestFirst,
}

/// Filters and pagination for a query.
///
/// All filters are optional and combine with AND.  Date bounds are inclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Restrict to one chain; `None` searches every chain.
    pub chain_id: Option<String>,
    /// Exact match on `initiator`.
    pub initiator: Option<String>,
    /// Exact match on `event_type`.
    pub event_type: Option<String>,
    /// Exact match on the payload's string `target` field.
    pub target: Option<String>,
    /// Inclusive lower bound on `timestamp`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    pub end: Option<DateTime<Utc>>,
    /// Matches to skip before the page starts.
    pub offset: usize,
    /// Page size; `None` returns every match after `offset`.
    pub limit: Option<usize>,
    pub order: SortOrder,
}

impl AuditQuery {
    pub fn chain(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    pub fn initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = Some(initiator.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = SortOrder::OldestFirst;
        self
    }

    /// True when `event` passes every filter (pagination aside).
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(chain_id) = &self.chain_id {
            if &event.chain_id != chain_id {
                return false;
            }
        }
        if let Some(initiator) = &self.initiator {
            if &event.initiator != initiator {
                return false;
            }
        }
        if let Some(event_type) = &self.event_type {
            if &event.event_type != event_type {
                return false;
            }
        }
        if let Some(target) = &self.target {
            if event.payload.get("target").and_then(|v| v.as_str()) != Some(target.as_str()) {
                return false;
            }
        }
        if let Some(start) = self.start {
            if event.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if event.timestamp > end {
                return false;
            }
        }
        true
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPage {
    pub items: Vec<AuditEvent>,
    /// Number of matches before pagination.
    pub total: usize,
}

/// Aggregate counts over every stored event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total_events: u64,
    pub per_chain: BTreeMap<String, u64>,
    pub per_event_type: BTreeMap<String, u64>,
    pub per_initiator: BTreeMap<String, u64>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

impl AuditSummary {
    /// Fold one event into the counts.
    pub fn observe(&mut self, event: &AuditEvent) {
        self.total_events += 1;
        *self.per_chain.entry(event.chain_id.clone()).or_default() += 1;
        *self.per_event_type.entry(event.event_type.clone()).or_default() += 1;
        *self.per_initiator.entry(event.initiator.clone()).or_default() += 1;
        self.oldest = Some(match self.oldest {
            Some(t) if t <= event.timestamp => t,
            _ => event.timestamp,
        });
        self.newest = Some(match self.newest {
            Some(t) if t >= event.timestamp => t,
            _ => event.timestamp,
        });
    }
}
