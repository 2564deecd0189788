//! Chain verification.
//!
//! Replays a chain segment by segment and checks every link.  The verifier
//! only reads: its single side effect is one telemetry record per run.

use std::sync::Arc;

use tracing::{debug, info, warn};

use chronicle_contracts::{
    error::ChronicleResult,
    event::{new_trace_id, AuditEvent},
    segment::{CorruptRecord, SegmentEntry},
    telemetry::{TelemetryOutcome, TelemetryRecord},
    verify::VerificationResult,
};
use chronicle_core::traits::{Clock, SegmentStore, TelemetrySink};

use crate::chain::check_link;

/// Event type carried by verification telemetry.
pub const VERIFY_EVENT_TYPE: &str = "CHAIN_VERIFY";

/// Running state of one verification pass.
struct Replay {
    /// First index the chain is expected to hold.
    floor: u64,
    /// Last event seen below `floor` before anything else: an expired
    /// segment whose deletion was interrupted after the anchor was written.
    leftover: Option<(u64, String)>,
    expected_index: u64,
    expected_previous_hash: String,
    events_checked: u64,
    total_events: u64,
    terminal_hash: Option<String>,
    broken: Option<(u64, String)>,
    warnings: Vec<CorruptRecord>,
}

impl Replay {
    fn starting_at(index: u64, previous_hash: String) -> Self {
        Self {
            floor: index,
            leftover: None,
            expected_index: index,
            expected_previous_hash: previous_hash,
            events_checked: 0,
            total_events: 0,
            terminal_hash: None,
            broken: None,
            warnings: Vec::new(),
        }
    }

    fn event(&mut self, event: &AuditEvent) {
        if self.total_events == 0 && event.sequence_index < self.floor {
            self.leftover = Some((event.sequence_index, event.hash.clone()));
            return;
        }
        self.settle_leftover();
        self.total_events += 1;
        if self.broken.is_some() {
            return;
        }
        match check_link(event, self.expected_index, &self.expected_previous_hash) {
            Ok(()) => {
                self.events_checked += 1;
                self.expected_index += 1;
                self.expected_previous_hash = event.hash.clone();
                self.terminal_hash = Some(event.hash.clone());
            }
            Err(failure) => self.broken = Some((self.expected_index, failure.describe())),
        }
    }

    fn corrupt(&mut self, record: &CorruptRecord) {
        self.warnings.push(record.clone());
        if record.torn {
            return;
        }
        self.settle_leftover();
        // A complete line that does not parse occupies a slot in the chain.
        self.total_events += 1;
        if self.broken.is_none() {
            self.broken = Some((
                self.expected_index,
                format!(
                    "malformed record at {} line {}: {}",
                    record.segment, record.line, record.reason
                ),
            ));
        }
    }

    /// Leftover events must end exactly where the anchor picks up.
    fn settle_leftover(&mut self) {
        let Some((index, hash)) = self.leftover.take() else {
            return;
        };
        if self.broken.is_none() && (index + 1 != self.floor || hash != self.expected_previous_hash) {
            self.broken = Some((
                self.floor,
                format!(
                    "events below the retention anchor end at index {}, which does not lead to index {}",
                    index, self.floor
                ),
            ));
        }
    }
}

/// Verifies chains against a segment store.
pub struct ChainVerifier {
    store: Arc<dyn SegmentStore>,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
}

impl ChainVerifier {
    pub fn new(
        store: Arc<dyn SegmentStore>,
        telemetry: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            telemetry,
            clock,
        }
    }

    /// Verify one chain.
    ///
    /// Starts at genesis, or at the retention anchor when the chain has been
    /// pruned.  Each event is checked for sequence, hash and link, in that
    /// order; the first failure decides `broken_at_index` and scanning goes
    /// on only to count `total_events`.
    ///
    /// Events below the anchor that come before everything else are left
    /// over from a prune that stopped after writing its anchor.  They are
    /// skipped when the last of them leads exactly to the anchor, and break
    /// the chain at the anchor otherwise.
    ///
    /// Torn trailing records are skipped and reported in `warnings`.  A
    /// complete but unparseable line breaks the chain at the index it
    /// occupies.
    ///
    /// The scheduler gets a turn between segments; dropping the returned
    /// future stops verification at the next segment boundary.
    ///
    /// Only storage failures are errors.  A broken chain is a normal result
    /// with `valid == false`; use `VerificationResult::into_result` to turn
    /// it into an error.
    pub async fn verify(&self, chain_id: &str) -> ChronicleResult<VerificationResult> {
        let anchor = self.store.read_anchor(chain_id).await?;
        let mut replay = match &anchor {
            Some(anchor) => {
                debug!(
                    chain_id = %chain_id,
                    sequence_index = anchor.sequence_index,
                    "verifying from retention anchor"
                );
                Replay::starting_at(anchor.sequence_index, anchor.previous_hash.clone())
            }
            None => Replay::starting_at(0, AuditEvent::GENESIS_HASH.to_string()),
        };
        let first_index = replay.expected_index;

        for info in self.store.segments(chain_id).await? {
            let read = self.store.read_segment(&info.id).await?;
            for entry in &read.entries {
                match entry {
                    SegmentEntry::Event(event) => replay.event(event),
                    SegmentEntry::Corrupt(record) => replay.corrupt(record),
                }
            }
            tokio::task::yield_now().await;
        }
        replay.settle_leftover();

        let (broken_at_index, reason) = match replay.broken {
            Some((index, reason)) => (Some(index), Some(reason)),
            None => (None, None),
        };
        let result = VerificationResult {
            chain_id: chain_id.to_string(),
            valid: broken_at_index.is_none(),
            broken_at_index,
            reason,
            events_checked: replay.events_checked,
            total_events: replay.total_events,
            first_index,
            terminal_hash: replay.terminal_hash,
            warnings: replay.warnings,
        };

        self.report(&result);
        Ok(result)
    }

    fn report(&self, result: &VerificationResult) {
        let outcome = match (result.broken_at_index, &result.reason) {
            (Some(index), reason) => {
                let reason = reason.clone().unwrap_or_default();
                warn!(
                    chain_id = %result.chain_id,
                    index,
                    reason = %reason,
                    "audit chain integrity violation"
                );
                TelemetryOutcome::IntegrityViolation { index, reason }
            }
            (None, _) => {
                info!(
                    chain_id = %result.chain_id,
                    events = result.events_checked,
                    warnings = result.warnings.len(),
                    "audit chain verified"
                );
                TelemetryOutcome::Verified {
                    events: result.events_checked,
                }
            }
        };
        self.telemetry.emit(TelemetryRecord {
            trace_id: new_trace_id(),
            chain_id: result.chain_id.clone(),
            event_type: VERIFY_EVENT_TYPE.to_string(),
            timestamp: self.clock.now(),
            outcome,
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
