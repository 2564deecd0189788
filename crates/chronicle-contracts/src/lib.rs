//! # chronicle-contracts
//!
//! Shared types and the error taxonomy for the Chronicle audit trail.
//!
//! Every crate in the workspace imports from here.  No chain logic lives in
//! this crate, only data definitions, their conversions and error types.

pub mod error;
pub mod event;
pub mod payload;
pub mod query;
pub mod report;
pub mod segment;
pub mod telemetry;
pub mod verify;
