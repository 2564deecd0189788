//! Error taxonomy for the Chronicle audit trail.
//!
//! Every fallible operation returns `ChronicleResult<T>`.  Ingestion-path
//! errors (`Validation`, `Encoding`, `Persistence`) reach the caller
//! synchronously so the originating business action can fail closed.
//! A broken chain is normally returned as data in a `VerificationResult`;
//! `IntegrityViolation` exists for callers that want it as an error.

use thiserror::Error;

/// The unified error type for the Chronicle crates.
#[derive(Debug, Error)]
pub enum ChronicleError {
    /// Append input was missing or malformed.  Nothing was written.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// The payload cannot be serialized deterministically.  Nothing was written.
    #[error("encoding error: {reason}")]
    Encoding { reason: String },

    /// Durable storage was unavailable or a write failed.
    ///
    /// The action must be treated as NOT audited.
    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    /// Verification found a hash or link mismatch.
    #[error("integrity violation in chain '{chain_id}' at index {index}: {reason}")]
    IntegrityViolation {
        chain_id: String,
        index: u64,
        reason: String,
    },

    /// A configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl ChronicleError {
    /// Shorthand for a `Validation` error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }

    /// Shorthand for an `Encoding` error.
    pub fn encoding(reason: impl Into<String>) -> Self {
        Self::Encoding { reason: reason.into() }
    }

    /// Shorthand for a `Persistence` error.
    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence { reason: reason.into() }
    }

    /// Shorthand for a `Config` error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config { reason: reason.into() }
    }

    /// True for errors the caller caused (bad input), as opposed to storage
    /// or integrity problems.
    pub fn is_caller_fault(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Encoding { .. })
    }
}

/// Convenience alias used throughout the Chronicle crates.
pub type ChronicleResult<T> = Result<T, ChronicleError>;
