//! Retry wrappers.
//!
//! Two independent concerns, composed by the client:
//!
//! - [`with_backoff`] repeats a single service call on transient transport
//!   failures, sleeping `base × 2^(n-1)` (capped) between attempts.
//! - [`CorrectiveRetry`] re-issues a request whose output failed
//!   validation, appending a note describing what was wrong.

use std::future::Future;
use std::time::Duration;

use lectio_shared::RetryConfig;
use tracing::{info, warn};

use crate::backend::{BackendError, Completion, CompletionRequest};
use crate::error::GenerationError;
use crate::response::Violation;

// ---------------------------------------------------------------------------
// Transport backoff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.transport_max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Sleep after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Transport retries ran out, or the failure was not retryable.
#[derive(Debug, Clone)]
pub struct TransportFailure {
    pub attempts: u32,
    pub error: BackendError,
}

/// Run `call` until it succeeds, fails permanently, or attempts run out.
pub async fn with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, TransportFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient service failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(TransportFailure {
                    attempts: attempt,
                    error,
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Corrective retry
// ---------------------------------------------------------------------------

/// Re-prompts after structurally invalid output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectiveRetry {
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl CorrectiveRetry {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.validation_max_attempts.max(1),
        }
    }

    /// Issue `request` via `call` and validate the result. On a violation the
    /// note produced by `correct` is appended to the user prompt and the
    /// request is issued again. Corrections accumulate across attempts.
    ///
    /// Errors from `call` (network, budget) end the loop immediately.
    pub async fn run<T, Call, Fut, Validate, Correct>(
        &self,
        operation: &str,
        mut request: CompletionRequest,
        mut call: Call,
        validate: Validate,
        correct: Correct,
    ) -> Result<T, GenerationError>
    where
        Call: FnMut(CompletionRequest, u32) -> Fut,
        Fut: Future<Output = Result<Completion, GenerationError>>,
        Validate: Fn(&Completion) -> Result<T, Violation>,
        Correct: Fn(&Violation) -> String,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let completion = call(request.clone(), attempt).await?;
            match validate(&completion) {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempt, "output accepted after correction");
                    }
                    return Ok(value);
                }
                Err(violation) if attempt < max_attempts => {
                    warn!(operation, attempt, %violation, "invalid output, re-prompting");
                    request.amend(&correct(&violation));
                    attempt += 1;
                }
                Err(violation) => {
                    warn!(operation, attempt, %violation, "invalid output, giving up");
                    return Err(GenerationError::Validation {
                        operation: operation.to_string(),
                        attempts: attempt,
                        violation,
                    });
                }
            }
        }
    }
}

impl Default for CorrectiveRetry {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
