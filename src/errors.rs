//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the statute pipeline, providing a structured
//! taxonomy that mirrors how each failure class is handled at runtime.
//!
//! ## Error Categories
//! - **DataError**: a single malformed input document — reject it, continue the batch
//! - **OracleUnavailable**: network/timeout/quota on the decision oracle — always
//!   recoverable via the deterministic fallback, never fatal
//! - **AmbiguousOrdering**: no date and an inconclusive oracle — resolved by the
//!   documented ingestion-order policy and surfaced as output metadata
//! - **InvariantViolation**: e.g. an attempted cross-jurisdiction merge — fatal to
//!   that one operation, logged, processing continues
//!
//! Infrastructure errors (storage, serialization, config) are carried alongside
//! the taxonomy so `?` composes across module boundaries.

use thiserror::Error;

/// Result type used throughout the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error types for the statute pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A single input document is malformed or missing required fields
    #[error("invalid document '{id}': {reason}")]
    DataError { id: String, reason: String },

    /// The decision oracle could not be reached or answered in time
    #[error("decision oracle unavailable: {details}")]
    OracleUnavailable { details: String },

    /// Chronological order could not be established from dates or the oracle
    #[error("ambiguous ordering in group '{group}': {details}")]
    AmbiguousOrdering { group: String, details: String },

    /// A core invariant would be broken by the requested operation
    #[error("invariant violation: {details}")]
    InvariantViolation { details: String },

    /// Configuration loading or validation errors
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Validation errors on configuration fields
    #[error("validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    /// The run was aborted cooperatively between documents
    #[error("pipeline run aborted")]
    Aborted,

    /// Checkpoint database errors
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Checkpoint value encoding errors
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON input/export errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP client errors from the remote oracle adapter
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal system errors
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// Check if the error is recoverable within the current run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::DataError { .. }
                | PipelineError::OracleUnavailable { .. }
                | PipelineError::AmbiguousOrdering { .. }
                | PipelineError::InvariantViolation { .. }
                | PipelineError::Http(_)
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::DataError { .. } => "data",
            PipelineError::OracleUnavailable { .. } | PipelineError::Http(_) => "oracle",
            PipelineError::AmbiguousOrdering { .. } => "ordering",
            PipelineError::InvariantViolation { .. } => "invariant",
            PipelineError::Config { .. }
            | PipelineError::ValidationFailed { .. }
            | PipelineError::Toml(_) => "configuration",
            PipelineError::Storage(_)
            | PipelineError::Serialization(_)
            | PipelineError::Json(_)
            | PipelineError::Io(_) => "storage",
            PipelineError::Aborted => "pipeline",
            PipelineError::Internal { .. } => "generic",
        }
    }
}

/// Helper macro for internal errors
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::errors::PipelineError::Internal {
            message: $msg.to_string(),
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::PipelineError::Internal {
            message: format!($fmt, $($arg)*),
        }
    };
}
