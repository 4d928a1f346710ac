//! Error types for the Loomline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! The taxonomy mirrors how failures propagate through the orchestrator:
//! transient step failures are retried and then escalated; malformed
//! reasoning output and malformed identities are fatal immediately; delivery
//! failures are logged and absorbed.

use thiserror::Error;

/// The top-level error type for all Loomline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Identity errors ---
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    // --- Reasoning / tool step errors ---
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    // --- Delivery errors ---
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum IdentityError {
    #[error("Malformed workflow identity: {0}")]
    Malformed(String),
}

/// Errors from the thought/action/observation/compaction steps.
///
/// `is_transient` drives the retry wrapper: only transient failures are
/// retried; everything else escalates on first occurrence.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("Backend request failed: {0}")]
    Backend(String),

    #[error("Step timed out: {step} after {timeout_secs}s")]
    Timeout { step: String, timeout_secs: u64 },

    #[error("Malformed reasoning output: {0}")]
    MalformedOutput(String),

    #[error("Retries exhausted for {step} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        step: String,
        attempts: u32,
        last_error: String,
    },
}

impl StepError {
    /// Whether this failure may succeed on retry.
    ///
    /// Malformed output indicates a backend or prompt defect, not transience,
    /// and exhausted retries are already terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, StepError::Backend(_) | StepError::Timeout { .. })
    }
}

#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("No delivery callback registered for platform: {0}")]
    NoCallback(String),

    #[error("No active platform for unified session: {0}")]
    UnresolvedSession(String),

    #[error("Delivery to {platform} failed: {reason}")]
    Failed { platform: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Session link not found for {platform}/{chat_id}")]
    LinkNotFound { platform: String, chat_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_transience() {
        assert!(StepError::Backend("connection reset".into()).is_transient());
        assert!(
            StepError::Timeout {
                step: "thought".into(),
                timeout_secs: 300,
            }
            .is_transient()
        );
        assert!(!StepError::MalformedOutput("unknown kind".into()).is_transient());
        assert!(
            !StepError::RetriesExhausted {
                step: "observation".into(),
                attempts: 5,
                last_error: "boom".into(),
            }
            .is_transient()
        );
    }

    #[test]
    fn identity_error_displays_correctly() {
        let err = Error::Identity(IdentityError::Malformed("not json".into()));
        assert!(err.to_string().contains("not json"));
    }

    #[test]
    fn delivery_error_displays_correctly() {
        let err = Error::Delivery(DeliveryError::NoCallback("discord".into()));
        assert!(err.to_string().contains("discord"));
    }
}
