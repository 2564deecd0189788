//! Whole-segment retention.
//!
//! A segment is deleted once its newest event is older than the cutoff.
//! Only a prefix of each chain is ever removed: the first segment that must
//! be kept ends the pass for that chain, so no retained event loses its
//! predecessor silently.  The link that crossed the cut is checked, then
//! recorded as the chain's retention anchor, and verification starts there.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use chronicle_contracts::{
    error::{ChronicleError, ChronicleResult},
    event::AuditEvent,
    report::{ChainPruneReport, PruneReport},
    segment::{RetentionAnchor, SegmentId},
};
use chronicle_core::traits::{Clock, SegmentStore};

use crate::recorder::ChainRecorder;

/// Deletes expired segments.
pub struct RetentionPruner {
    recorder: Arc<ChainRecorder>,
    clock: Arc<dyn Clock>,
}

impl RetentionPruner {
    pub fn new(recorder: Arc<ChainRecorder>, clock: Arc<dyn Clock>) -> Self {
        Self { recorder, clock }
    }

    /// Delete every segment whose newest event is more than
    /// `older_than_days` days old, across all chains.
    ///
    /// Each chain is pruned under its append lock.  Chains with nothing to
    /// delete are left out of `PruneReport::chains`.
    pub async fn prune(&self, older_than_days: u32) -> ChronicleResult<PruneReport> {
        if older_than_days == 0 {
            return Err(ChronicleError::validation("older_than_days must be at least 1"));
        }
        let now = self.clock.now();
        let cutoff = now - Duration::days(i64::from(older_than_days));
        debug!(cutoff = %cutoff, "pruning audit segments");

        let mut report = PruneReport::default();
        for chain_id in self.store().chains().await? {
            let chain = self.prune_chain(&chain_id, cutoff, now).await?;
            if chain.segments_deleted == 0 {
                continue;
            }
            report.segments_deleted += chain.segments_deleted;
            report.events_deleted += chain.events_deleted;
            report.chains.push(chain);
        }
        Ok(report)
    }

    /// Prune one chain.  Holds the chain's append lock throughout.
    ///
    /// The anchor is written before any segment is deleted, so an
    /// interruption leaves either the untouched chain or an anchored chain
    /// with some expired segments still on disk; the verifier accepts both.
    ///
    /// # Errors
    ///
    /// `IntegrityViolation` when the first retained event does not link to
    /// the last expired one.  Nothing is deleted in that case.
    pub async fn prune_chain(
        &self,
        chain_id: &str,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ChronicleResult<ChainPruneReport> {
        let _guard = self.recorder.lock_chain(chain_id).await;
        let store = self.store();

        let mut report = ChainPruneReport {
            chain_id: chain_id.to_string(),
            ..ChainPruneReport::default()
        };
        let mut expired: Vec<SegmentId> = Vec::new();
        let mut last_deleted: Option<AuditEvent> = None;
        let mut first_retained: Option<AuditEvent> = None;
        let mut cut_reached = false;

        for info in store.segments(chain_id).await? {
            let read = store.read_segment(&info.id).await?;
            if !cut_reached {
                let newest = read
                    .events()
                    .map(|e| e.timestamp)
                    .max()
                    .unwrap_or_else(|| info.id.window_end());
                if newest < cutoff {
                    let events = read.into_events();
                    report.events_deleted += events.len() as u64;
                    if let Some(last) = events.into_iter().last() {
                        last_deleted = Some(last);
                    }
                    expired.push(info.id);
                    continue;
                }
                cut_reached = true;
            }
            first_retained = read.into_events().into_iter().next();
            if first_retained.is_some() {
                break;
            }
        }

        if expired.is_empty() {
            return Ok(report);
        }

        if let (Some(last), Some(first)) = (&last_deleted, &first_retained) {
            if first.sequence_index != last.sequence_index + 1 || first.previous_hash != last.hash {
                return Err(ChronicleError::IntegrityViolation {
                    chain_id: chain_id.to_string(),
                    index: first.sequence_index,
                    reason: format!(
                        "first retained event does not follow expired event {}; refusing to prune",
                        last.sequence_index
                    ),
                });
            }
        }

        let anchor = match (&last_deleted, &first_retained) {
            (Some(last), _) => Some(RetentionAnchor {
                sequence_index: last.sequence_index + 1,
                previous_hash: last.hash.clone(),
                pruned_at: now,
            }),
            (None, Some(first)) => Some(RetentionAnchor {
                sequence_index: first.sequence_index,
                previous_hash: first.previous_hash.clone(),
                pruned_at: now,
            }),
            (None, None) => None,
        };
        if let Some(anchor) = anchor {
            store.write_anchor(chain_id, &anchor).await?;
            report.anchor_sequence = Some(anchor.sequence_index);
        }

        for segment in &expired {
            store.delete_segment(segment).await?;
            debug!(segment = %segment, "deleted expired segment");
            report.segments_deleted += 1;
        }

        info!(
            chain_id = %chain_id,
            segments = report.segments_deleted,
            events = report.events_deleted,
            anchor = ?report.anchor_sequence,
            "pruned audit chain"
        );
        Ok(report)
    }

    fn store(&self) -> &Arc<dyn SegmentStore> {
        self.recorder.store()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
