//! On-disk segment store.
//!
//! Layout under the configured root:
//!
//! ```text
//! <root>/<chain-dir>/20260301-0000.jsonl
//! <root>/<chain-dir>/20260301-0001.jsonl
//! <root>/<chain-dir>/20260302-0000.jsonl
//! <root>/<chain-dir>/anchor.json
//! ```
//!
//! File names sort in append order, so a reader can enumerate a chain's
//! segments without an index.  Appends open the segment in append mode,
//! write one full record and `sync_data` it before returning.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use chronicle_contracts::{
    error::{ChronicleError, ChronicleResult},
    event::AuditEvent,
    segment::{RetentionAnchor, SegmentEntry, SegmentId, SegmentInfo, SegmentRead},
};
use chronicle_core::{config::StoreConfig, traits::SegmentStore};

use crate::segment::{
    decode_chain_dir, encode_chain_dir, encode_record, next_segment, parse_segment, ActiveSegment,
};

const ANCHOR_FILE: &str = "anchor.json";

fn io_error(action: &str, path: &Path, e: std::io::Error) -> ChronicleError {
    ChronicleError::Persistence {
        reason: format!("failed to {} '{}': {}", action, path.display(), e),
    }
}

/// Segment store backed by JSONL files.
///
/// The only in-memory state is a per-chain cache of the active segment
/// (size and whether its tail is clean).  It is dropped while a write is in
/// flight and only restored once the write succeeds, so an append that
/// fails or is abandoned makes the next one re-inspect the file on disk.
#[derive(Debug)]
pub struct FileSegmentStore {
    root: PathBuf,
    max_segment_bytes: u64,
    sync_writes: bool,
    active: Mutex<HashMap<String, ActiveSegment>>,
}

impl FileSegmentStore {
    /// Open (creating if needed) a store rooted at `config.root`.
    pub async fn open(config: &StoreConfig) -> ChronicleResult<Self> {
        fs::create_dir_all(&config.root)
            .await
            .map_err(|e| io_error("create store root", &config.root, e))?;
        info!(root = %config.root.display(), "opened file segment store");
        Ok(Self {
            root: config.root.clone(),
            max_segment_bytes: config.max_segment_bytes,
            sync_writes: config.sync_writes,
            active: Mutex::new(HashMap::new()),
        })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a chain's segments.
    pub fn chain_dir(&self, chain_id: &str) -> PathBuf {
        self.root.join(encode_chain_dir(chain_id))
    }

    /// Path of one segment file.
    pub fn segment_path(&self, segment: &SegmentId) -> PathBuf {
        self.chain_dir(&segment.chain_id).join(segment.file_name())
    }

    fn cached_active(&self, chain_id: &str) -> ChronicleResult<Option<ActiveSegment>> {
        let active = self.active.lock().map_err(|e| ChronicleError::Persistence {
            reason: format!("active segment cache lock poisoned: {}", e),
        })?;
        Ok(active.get(chain_id).cloned())
    }

    fn set_active(&self, chain_id: &str, segment: Option<ActiveSegment>) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match segment {
            Some(segment) => active.insert(chain_id.to_string(), segment),
            None => active.remove(chain_id),
        };
    }

    /// Inspect the newest segment on disk: its size and whether it ends in
    /// a newline.
    async fn discover_active(&self, chain_id: &str) -> ChronicleResult<Option<ActiveSegment>> {
        let Some(last) = self.segments(chain_id).await?.pop() else {
            return Ok(None);
        };
        let path = self.segment_path(&last.id);
        let clean_tail = if last.size_bytes == 0 {
            true
        } else {
            let mut file = fs::File::open(&path)
                .await
                .map_err(|e| io_error("open segment", &path, e))?;
            file.seek(SeekFrom::Start(last.size_bytes - 1))
                .await
                .map_err(|e| io_error("seek segment", &path, e))?;
            let mut byte = [0u8; 1];
            file.read_exact(&mut byte)
                .await
                .map_err(|e| io_error("read segment tail", &path, e))?;
            byte[0] == b'\n'
        };
        if !clean_tail {
            warn!(segment = %last.id, "segment ends in a torn record; next append rotates");
        }
        Ok(Some(ActiveSegment {
            id: last.id,
            size: last.size_bytes,
            clean_tail,
        }))
    }

    async fn write_record(&self, path: &Path, record: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(record).await?;
        if self.sync_writes {
            file.sync_data().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SegmentStore for FileSegmentStore {
    async fn append(&self, event: &AuditEvent) -> ChronicleResult<()> {
        let chain_id = event.chain_id.as_str();
        let record = encode_record(event)?;

        let active = match self.cached_active(chain_id)? {
            Some(active) => Some(active),
            None => self.discover_active(chain_id).await?,
        };
        let target = next_segment(
            active.as_ref(),
            chain_id,
            event.timestamp.date_naive(),
            record.len() as u64,
            self.max_segment_bytes,
        );
        let base_size = match &active {
            Some(a) if a.id == target => a.size,
            _ => {
                debug!(segment = %target, "rotating to new segment");
                0
            }
        };

        let dir = self.chain_dir(chain_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error("create chain directory", &dir, e))?;

        let path = dir.join(target.file_name());
        // Until the write completes, the cached size may no longer match the file.
        self.set_active(chain_id, None);
        if let Err(e) = self.write_record(&path, &record).await {
            error!(
                chain_id = %chain_id,
                sequence_index = event.sequence_index,
                segment = %target,
                error = %e,
                "segment append failed"
            );
            return Err(io_error("append to segment", &path, e));
        }

        self.set_active(
            chain_id,
            Some(ActiveSegment {
                id: target,
                size: base_size + record.len() as u64,
                clean_tail: true,
            }),
        );
        Ok(())
    }

    async fn last_event(&self, chain_id: &str) -> ChronicleResult<Option<AuditEvent>> {
        let segments = self.segments(chain_id).await?;
        for info in segments.iter().rev() {
            let read = self.read_segment(&info.id).await?;
            let last = read.entries.into_iter().rev().find_map(|entry| match entry {
                SegmentEntry::Event(event) => Some(event),
                SegmentEntry::Corrupt(_) => None,
            });
            if last.is_some() {
                return Ok(last);
            }
        }
        Ok(None)
    }

    async fn chains(&self) -> ChronicleResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("list store root", &self.root, e)),
        };

        let mut chains = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("list store root", &self.root, e))?
        {
            let name = entry.file_name();
            let Some(chain_id) = name.to_str().and_then(decode_chain_dir) else {
                continue;
            };
            if !self.segments(&chain_id).await?.is_empty() {
                chains.push(chain_id);
            }
        }
        chains.sort();
        Ok(chains)
    }

    async fn segments(&self, chain_id: &str) -> ChronicleResult<Vec<SegmentInfo>> {
        let dir = self.chain_dir(chain_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("list chain directory", &dir, e)),
        };

        let mut segments = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("list chain directory", &dir, e))?
        {
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|n| SegmentId::parse_file_name(chain_id, n))
            else {
                continue;
            };
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| io_error("stat segment", &entry.path(), e))?;
            segments.push(SegmentInfo {
                id,
                size_bytes: metadata.len(),
            });
        }
        segments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(segments)
    }

    async fn read_segment(&self, segment: &SegmentId) -> ChronicleResult<SegmentRead> {
        let path = self.segment_path(segment);
        let bytes = fs::read(&path)
            .await
            .map_err(|e| io_error("read segment", &path, e))?;
        let read = parse_segment(segment, &bytes);
        for record in read.warnings() {
            warn!(
                segment = %record.segment,
                line = record.line,
                torn = record.torn,
                reason = %record.reason,
                "skipping malformed segment record"
            );
        }
        Ok(read)
    }

    async fn delete_segment(&self, segment: &SegmentId) -> ChronicleResult<()> {
        let path = self.segment_path(segment);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error("delete segment", &path, e)),
        }
        if self
            .cached_active(&segment.chain_id)?
            .is_some_and(|active| &active.id == segment)
        {
            self.set_active(&segment.chain_id, None);
        }
        info!(segment = %segment, "deleted segment");
        Ok(())
    }

    async fn clear(&self, chain_id: &str) -> ChronicleResult<u64> {
        let count = self.segments(chain_id).await?.len() as u64;
        let dir = self.chain_dir(chain_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error("remove chain directory", &dir, e)),
        }
        self.set_active(chain_id, None);
        info!(chain_id = %chain_id, segments = count, "cleared chain");
        Ok(count)
    }

    async fn read_anchor(&self, chain_id: &str) -> ChronicleResult<Option<RetentionAnchor>> {
        let path = self.chain_dir(chain_id).join(ANCHOR_FILE);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read retention anchor", &path, e)),
        };
        let anchor = serde_json::from_slice(&bytes).map_err(|e| ChronicleError::Persistence {
            reason: format!("malformed retention anchor '{}': {}", path.display(), e),
        })?;
        Ok(Some(anchor))
    }

    async fn write_anchor(&self, chain_id: &str, anchor: &RetentionAnchor) -> ChronicleResult<()> {
        let dir = self.chain_dir(chain_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error("create chain directory", &dir, e))?;

        let bytes = serde_json::to_vec_pretty(anchor).map_err(|e| ChronicleError::Encoding {
            reason: format!("failed to serialize retention anchor: {}", e),
        })?;
        let tmp = dir.join(format!("{}.tmp", ANCHOR_FILE));
        let path = dir.join(ANCHOR_FILE);
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| io_error("write retention anchor", &tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error("install retention anchor", &path, e))?;
        debug!(chain_id = %chain_id, sequence_index = anchor.sequence_index, "wrote retention anchor");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
