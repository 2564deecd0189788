//! # chronicle-audit
//!
//! Append-only, SHA-256 hash-chained audit trail.
//!
//! ## Overview
//!
//! Every recorded event names the hash of the event before it in its chain.
//! Altering, inserting, removing or reordering any stored event, even a
//! single byte of it, breaks a link and `ChainVerifier` reports the first
//! index where that happens.
//!
//! - [`canonical`]: deterministic JSON bytes for hashing
//! - [`chain`]: hashing and per-link checks
//! - [`recorder::ChainRecorder`]: serialized per-chain appends
//! - [`verifier::ChainVerifier`]: full-chain replay
//! - [`query::QueryEngine`]: filtered, paginated reads and summaries
//! - [`retention::RetentionPruner`]: whole-segment expiry
//! - [`telemetry`]: observability sinks
//! - [`trail::AuditTrail`]: the facade tying them together
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chronicle_audit::AuditTrail;
//! use chronicle_core::ChronicleConfig;
//! use serde_json::json;
//!
//! let trail = AuditTrail::from_config(&ChronicleConfig::default()).await?;
//! trail.record_to("c1", "u1", "LOGIN", json!({})).await?;
//! trail.record_to("c1", "u1", "FILE_UPLOAD", json!({ "size": 10 })).await?;
//!
//! let result = trail.verify_audit_chain("c1").await?;
//! assert!(result.valid);
//! ```

pub mod canonical;
pub mod chain;
pub mod query;
pub mod recorder;
pub mod retention;
pub mod tail;
pub mod telemetry;
pub mod trail;
pub mod verifier;

pub use chain::{hash_event, verify_chain};
pub use query::QueryEngine;
pub use recorder::ChainRecorder;
pub use retention::RetentionPruner;
pub use telemetry::{ChannelTelemetry, NoopTelemetry, TracingTelemetry};
pub use trail::AuditTrail;
pub use verifier::ChainVerifier;
