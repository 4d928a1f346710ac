//! Retrying call wrapper for blocking collaborator invocations.
//!
//! A plain policy value applied around each step: bounded attempts, fixed or
//! multiplying backoff, and a per-attempt timeout. Only transient failures
//! are retried; fatal errors (malformed reasoning output) pass through on the
//! first occurrence. Exhausted retries escalate as
//! `StepError::RetriesExhausted`, which ends the generation.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::StepError;

/// Retry policy for one step class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Backoff before the second attempt.
    pub initial_backoff: Duration,

    /// Backoff multiplier between attempts (1.0 = fixed backoff).
    pub multiplier: f64,

    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Fast steps: message persistence, session-link lookups.
    pub fn fast() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            multiplier: 1.0,
            timeout: Duration::from_secs(15),
        }
    }

    /// The reasoning step, which can run long.
    pub fn reasoning() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            multiplier: 1.0,
            timeout: Duration::from_secs(300),
        }
    }

    /// Observation and compaction summarization.
    pub fn observation() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            multiplier: 1.0,
            timeout: Duration::from_secs(60),
        }
    }

    /// Run `op` under this policy.
    ///
    /// `step` names the operation in logs and escalated errors.
    pub async fn run<T, F, Fut>(&self, step: &str, mut op: F) -> Result<T, StepError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let mut backoff = self.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts.max(1) {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(StepError::Timeout {
                    step: step.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(step, attempt, "Step succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    warn!(step, attempt, error = %e, "Transient step failure");
                    last_error = e.to_string();
                    if attempt < self.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.mul_f64(self.multiplier.max(1.0));
                    }
                }
                // Fatal: not retried.
                Err(e) => return Err(e),
            }
        }

        Err(StepError::RetriesExhausted {
            step: step.to_string(),
            attempts: self.max_attempts,
            last_error,
        })
    }
}
