//! Filtered, paginated reads over stored events.
//!
//! The query path trusts storage: it never re-hashes.  Run the verifier
//! first when integrity matters.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use chronicle_contracts::{
    error::ChronicleResult,
    event::AuditEvent,
    query::{AuditQuery, AuditSummary, QueryPage, SortOrder},
    segment::SegmentId,
};
use chronicle_core::traits::SegmentStore;

/// Reads events across chains and segments.
pub struct QueryEngine {
    store: Arc<dyn SegmentStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn SegmentStore>) -> Self {
        Self { store }
    }

    /// Every event matching `query`, sorted and paginated.
    ///
    /// Segments dated outside `[start, end]` are not read.  `total` counts
    /// every match before `offset` and `limit` apply.
    pub async fn query(&self, query: &AuditQuery) -> ChronicleResult<QueryPage> {
        let chains = match &query.chain_id {
            Some(chain_id) => vec![chain_id.clone()],
            None => self.store.chains().await?,
        };

        let mut matches = Vec::new();
        let mut segments_read = 0usize;
        for chain_id in &chains {
            for info in self.store.segments(chain_id).await? {
                if !in_window(&info.id, query) {
                    continue;
                }
                let read = self.store.read_segment(&info.id).await?;
                segments_read += 1;
                matches.extend(read.into_events().into_iter().filter(|e| query.matches(e)));
                tokio::task::yield_now().await;
            }
        }

        matches.sort_by(|a, b| match query.order {
            SortOrder::OldestFirst => chronological(a, b),
            SortOrder::NewestFirst => chronological(b, a),
        });

        let total = matches.len();
        let items: Vec<AuditEvent> = matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        debug!(
            chains = chains.len(),
            segments_read,
            total,
            returned = items.len(),
            "audit query"
        );
        Ok(QueryPage { items, total })
    }

    /// Counts over every stored event.
    pub async fn summary(&self) -> ChronicleResult<AuditSummary> {
        let mut summary = AuditSummary::default();
        for chain_id in self.store.chains().await? {
            for info in self.store.segments(&chain_id).await? {
                let read = self.store.read_segment(&info.id).await?;
                read.events().for_each(|e| summary.observe(e));
                tokio::task::yield_now().await;
            }
        }
        Ok(summary)
    }
}

/// Recorded timestamps never go backwards within a chain, so every event in
/// a segment carries the segment's UTC date and a segment dated outside the
/// window cannot hold a match.
fn in_window(segment: &SegmentId, query: &AuditQuery) -> bool {
    if let Some(start) = query.start {
        if segment.date < start.date_naive() {
            return false;
        }
    }
    if let Some(end) = query.end {
        if segment.date > end.date_naive() {
            return false;
        }
    }
    true
}

fn chronological(a: &AuditEvent, b: &AuditEvent) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then(a.sequence_index.cmp(&b.sequence_index))
        .then_with(|| a.chain_id.cmp(&b.chain_id))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    use chronicle_contracts::event::AppendRequest;
    use chronicle_core::clock::ManualClock;
    use chronicle_store::InMemorySegmentStore;

    use super::*;
    use crate::recorder::ChainRecorder;
    use crate::telemetry::NoopTelemetry;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, d, 10, 0, 0).unwrap()
    }

    /// Six events over three days and two chains:
    ///
    /// | day | chain | initiator | type        |
    /// |-----|-------|-----------|-------------|
    /// | 1   | a     | u1        | LOGIN       |
    /// | 1   | b     | u2        | LOGIN       |
    /// | 2   | a     | u1        | FILE_UPLOAD |
    /// | 2   | b     | u1        | LOGIN       |
    /// | 3   | a     | u2        | FILE_UPLOAD |
    /// | 3   | b     | u1        | FILE_UPLOAD |
    async fn populated() -> QueryEngine {
        let store = Arc::new(InMemorySegmentStore::default());
        let clock = Arc::new(ManualClock::new(day(1)));
        let recorder = ChainRecorder::new(store.clone(), Arc::new(NoopTelemetry), clock.clone());
        let rows = [
            (1, "a", "u1", "LOGIN"),
            (1, "b", "u2", "LOGIN"),
            (2, "a", "u1", "FILE_UPLOAD"),
            (2, "b", "u1", "LOGIN"),
            (3, "a", "u2", "FILE_UPLOAD"),
            (3, "b", "u1", "FILE_UPLOAD"),
        ];
        for (i, (d, chain, initiator, event_type)) in rows.into_iter().enumerate() {
            clock.set(day(d) + Duration::minutes(i as i64));
            recorder
                .append(AppendRequest::new(chain, initiator, event_type).with_payload(json!({})))
                .await
                .unwrap();
        }
        QueryEngine::new(store)
    }

    #[tokio::test]
    async fn no_filters_returns_everything_newest_first() {
        let engine = populated().await;
        let page = engine.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(page.total, 6);
        let stamps: Vec<_> = page.items.iter().map(|e| e.timestamp).collect();
        let mut sorted = stamps.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(stamps, sorted, "default order must be newest first");
    }

    #[tokio::test]
    async fn initiator_filter_spans_chains_and_segments() {
        let engine = populated().await;
        let page = engine.query(&AuditQuery::default().initiator("u1")).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.items.len(), 4);
        assert!(page.items.iter().all(|e| e.initiator == "u1"));
        let chains: std::collections::BTreeSet<_> =
            page.items.iter().map(|e| e.chain_id.as_str()).collect();
        assert_eq!(chains.len(), 2);
    }

    #[tokio::test]
    async fn filters_combine() {
        let engine = populated().await;
        let query = AuditQuery::default()
            .chain("a")
            .event_type("FILE_UPLOAD")
            .oldest_first();
        let page = engine.query(&query).await.unwrap();
        let initiators: Vec<_> = page.items.iter().map(|e| e.initiator.as_str()).collect();
        assert_eq!(initiators, vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn date_window_is_inclusive() {
        let engine = populated().await;
        let start = day(2) + Duration::minutes(2);
        let end = day(2) + Duration::minutes(3);
        let page = engine
            .query(&AuditQuery::default().since(start).until(end))
            .await
            .unwrap();
        assert_eq!(page.total, 2, "both day-2 events sit on the bounds");
    }

    #[tokio::test]
    async fn pagination_keeps_total() {
        let engine = populated().await;
        let page = engine
            .query(&AuditQuery::default().oldest_first().offset(2).limit(3))
            .await
            .unwrap();
        assert_eq!(page.total, 6);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.items[0].timestamp, day(2) + Duration::minutes(2));

        let past_end = engine
            .query(&AuditQuery::default().offset(10))
            .await
            .unwrap();
        assert_eq!(past_end.total, 6);
        assert!(past_end.items.is_empty());
    }

    #[tokio::test]
    async fn summary_counts_everything() {
        let engine = populated().await;
        let summary = engine.summary().await.unwrap();
        assert_eq!(summary.total_events, 6);
        assert_eq!(summary.per_chain.get("a"), Some(&3));
        assert_eq!(summary.per_initiator.get("u1"), Some(&4));
        assert_eq!(summary.per_event_type.get("FILE_UPLOAD"), Some(&3));
        assert_eq!(summary.oldest, Some(day(1)));
        assert_eq!(summary.newest, Some(day(3) + Duration::minutes(5)));
    }

    #[test]
    fn window_excludes_segments_by_date() {
        let id = SegmentId {
            chain_id: "a".to_string(),
            date: day(2).date_naive(),
            part: 0,
        };
        assert!(in_window(&id, &AuditQuery::default()));
        assert!(in_window(&id, &AuditQuery::default().since(day(2)).until(day(2))));
        assert!(!in_window(&id, &AuditQuery::default().since(day(3))));
        assert!(!in_window(&id, &AuditQuery::default().until(day(1))));
    }
}
