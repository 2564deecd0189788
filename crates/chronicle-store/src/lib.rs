//! # chronicle-store
//!
//! Durable, rotated, append-only storage for audit chains.
//!
//! ## Overview
//!
//! Each chain is a sequence of segments.  A segment holds the events of one
//! UTC day, split into numbered parts when a part reaches the configured
//! size or when its tail is torn.  Records are newline-delimited JSON.
//!
//! - [`FileSegmentStore`] persists segments as files under a root directory.
//! - [`InMemorySegmentStore`] keeps the same bytes in memory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chronicle_core::config::StoreConfig;
//! use chronicle_store::FileSegmentStore;
//!
//! let store = FileSegmentStore::open(&StoreConfig::default()).await?;
//! ```

pub mod file;
pub mod memory;
pub mod segment;

pub use file::FileSegmentStore;
pub use memory::InMemorySegmentStore;
pub use segment::{decode_chain_dir, encode_chain_dir};
