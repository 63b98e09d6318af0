//! Runtime error types for the referral intake pipeline.
//!
//! All fallible operations in the pipeline return `IntakeResult<T>`.
//! Variants carry enough context to be written verbatim into a referral's
//! `ai_processing_error` slot and into the activity log.

use thiserror::Error;

/// The unified error type for the intake pipeline.
#[derive(Debug, Clone, Error)]
pub enum IntakeError {
    /// The referral a job or request points at does not exist.
    #[error("referral '{referral_id}' not found")]
    ReferralNotFound { referral_id: String },

    /// The document a job or request points at does not exist.
    #[error("document '{document_id}' not found")]
    DocumentNotFound { document_id: String },

    /// An external capability call exceeded its time budget.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },

    /// An external provider (blob storage, OCR, AI capability) failed.
    #[error("provider '{provider}' failed: {reason}")]
    Provider { provider: String, reason: String },

    /// A capability answered, but its structured output could not be verified
    /// or decoded into the expected shape.
    #[error("malformed output from '{capability}': {reason}")]
    MalformedOutput { capability: String, reason: String },

    /// A pipeline invariant was observed broken, e.g. extraction reached with
    /// an unclassified sibling document. Never retried.
    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    /// The referral store could not complete a read or write.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The caller asked for something the current state does not allow.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl IntakeError {
    /// Whether a job that failed with this error may be attempted again.
    ///
    /// Transient provider problems, timeouts, malformed output and storage
    /// hiccups are retried. Missing entities, invariant breaks, bad config
    /// and invalid requests are fatal for the job.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IntakeError::Timeout { .. }
                | IntakeError::Provider { .. }
                | IntakeError::MalformedOutput { .. }
                | IntakeError::Storage { .. }
        )
    }
}

/// Convenience alias used throughout the intake crates.
pub type IntakeResult<T> = Result<T, IntakeError>;
