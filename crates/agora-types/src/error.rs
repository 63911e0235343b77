//! Top-level error type for the agora runtime.
//!
//! [`AgoraError`] covers the failures that cross crate boundaries.
//! Variants are grouped into recoverable (provider, timeout, rate-limit)
//! and fatal (config, I/O, store corruption) categories. Tool-level
//! failures carry their own structured type in `agora-core` so they can
//! surface stable error codes to the LLM; they are not folded in here.

use thiserror::Error;

/// Top-level error type for the agora runtime.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AgoraError {
    // ── Recoverable ──────────────────────────────────────────────────

    /// An LLM provider call failed after retries were exhausted.
    #[error("provider error: {message}")]
    Provider {
        /// Provider-supplied error message.
        message: String,
    },

    /// An operation exceeded its deadline.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Human-readable name of the operation that timed out.
        operation: String,
    },

    /// An in-flight operation was aborted by request.
    #[error("operation aborted: {operation}")]
    Aborted {
        /// Human-readable name of the aborted operation.
        operation: String,
    },

    // ── Fatal ────────────────────────────────────────────────────────

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// A bus-level routing failure.
    #[error("bus error: {0}")]
    Bus(String),

    /// The org store rejected an operation.
    #[error("org error: {0}")]
    Org(String),

    /// A security boundary was violated (path traversal, oversized input).
    #[error("security violation: {reason}")]
    SecurityViolation {
        /// What policy was violated.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
