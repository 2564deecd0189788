//! # chronicle-core
//!
//! The seams of the Chronicle audit trail and its configuration.
//!
//! This crate provides:
//! - The three collaborator traits (`SegmentStore`, `TelemetrySink`, `Clock`)
//! - `SystemClock` and `ManualClock`
//! - `ChronicleConfig`, loaded from TOML
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chronicle_core::{config::ChronicleConfig, traits::SegmentStore};
//!
//! let config = ChronicleConfig::from_file(Path::new("chronicle.toml"))?;
//! ```

pub mod clock;
pub mod config;
pub mod traits;

pub use clock::{ManualClock, SystemClock};
pub use config::ChronicleConfig;
pub use traits::{Clock, SegmentStore, TelemetrySink};

// ── Tests ─────────────────────────────────────────────────────────────────────
