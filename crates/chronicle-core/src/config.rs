//! TOML configuration.
//!
//! Every section and field has a default, so an empty document is a valid
//! configuration.
//!
//! ```toml
//! [store]
//! root = "audit-trail"
//! max_segment_bytes = 8388608
//! sync_writes = true
//!
//! [chain]
//! default_chain = "global"
//! admin_chain = "_admin"
//!
//! [retention]
//! days = 365
//!
//! [telemetry]
//! sink = "tracing"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use chronicle_contracts::error::{ChronicleError, ChronicleResult};

/// Smallest accepted segment size.  Anything lower rotates on nearly every
/// record.
pub const MIN_SEGMENT_BYTES: u64 = 1024;

/// Segment store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one sub-directory per chain.
    pub root: PathBuf,
    /// A segment rotates before a record would push it past this size.
    pub max_segment_bytes: u64,
    /// `sync_data` after every append.
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("audit-trail"),
            max_segment_bytes: 8 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

/// Chain naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain used by `record_audit_event` when no chain is named.
    pub default_chain: String,
    /// Chain that receives clear and retention records about other chains.
    pub admin_chain: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            default_chain: "global".to_string(),
            admin_chain: "_admin".to_string(),
        }
    }
}

/// Retention settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Default window for `prune`.  `None` keeps everything.
    pub days: Option<u32>,
}

/// Where telemetry goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TelemetryKind {
    /// Structured `tracing` events.
    #[default]
    Tracing,
    /// Discard.
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub sink: TelemetryKind,
}

/// The top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChronicleConfig {
    pub store: StoreConfig,
    pub chain: ChainConfig,
    pub retention: RetentionConfig,
    pub telemetry: TelemetryConfig,
}

impl ChronicleConfig {
    /// Parse `s` as TOML and validate it.
    ///
    /// Returns `ChronicleError::Config` if the TOML is malformed, does not
    /// match the schema, or fails `validate`.
    pub fn from_toml_str(s: &str) -> ChronicleResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ChronicleError::Config {
            reason: format!("failed to parse config TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse the file at `path`.
    pub fn from_file(path: &Path) -> ChronicleResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ChronicleError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        debug!(path = %path.display(), "loaded configuration file");
        Self::from_toml_str(&contents)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ChronicleResult<()> {
        if self.chain.default_chain.trim().is_empty() {
            return Err(ChronicleError::config("chain.default_chain must not be empty"));
        }
        if self.chain.admin_chain.trim().is_empty() {
            return Err(ChronicleError::config("chain.admin_chain must not be empty"));
        }
        if self.chain.default_chain == self.chain.admin_chain {
            return Err(ChronicleError::config(
                "chain.default_chain and chain.admin_chain must differ",
            ));
        }
        if self.store.max_segment_bytes < MIN_SEGMENT_BYTES {
            return Err(ChronicleError::config(format!(
                "store.max_segment_bytes must be at least {}",
                MIN_SEGMENT_BYTES
            )));
        }
        if self.retention.days == Some(0) {
            return Err(ChronicleError::config("retention.days must be at least 1"));
        }
        Ok(())
    }
}
