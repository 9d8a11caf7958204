//! The generation client: prompt, price, call, validate.
//!
//! Every call goes through the same path: reserve the estimated cost,
//! issue the request with transport backoff, record actual usage, then
//! validate and correct. Budget refusals and exhausted retries surface as
//! [`GenerationError`]s for the orchestrator to degrade on.

use std::sync::Arc;
use std::time::Instant;

use lectio_shared::{
    AppConfig, FeastInfo, LiturgicalContext, Reading, ReadingSynopsis, Reflection, SynopsisEntry,
};
use tracing::{debug, info, instrument, warn};

use crate::backend::{Completion, CompletionRequest, TextBackend};
use crate::cost::{CostTracker, estimate_tokens};
use crate::error::GenerationError;
use crate::prompts;
use crate::response;
use crate::retry::{BackoffPolicy, CorrectiveRetry, with_backoff};

/// The two kinds of generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Synopsis,
    Reflection,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synopsis => "synopsis",
            Self::Reflection => "reflection",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for the client, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub synopsis_max_tokens: u32,
    pub reflection_max_tokens: u32,
    /// Output tokens assumed by the cost pre-flight for a synopsis.
    pub synopsis_expected_output: u64,
    /// Output tokens assumed by the cost pre-flight for a reflection.
    pub reflection_expected_output: u64,
    pub backoff: BackoffPolicy,
    pub corrective: CorrectiveRetry,
}

impl GenerationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            synopsis_max_tokens: config.generation.synopsis_max_tokens,
            reflection_max_tokens: config.generation.reflection_max_tokens,
            synopsis_expected_output: config.generation.synopsis_expected_output_tokens,
            reflection_expected_output: config.generation.reflection_expected_output_tokens,
            backoff: BackoffPolicy::from_config(&config.retry),
            corrective: CorrectiveRetry::from_config(&config.retry),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Cheap to clone; concurrent synopsis tasks each hold a copy.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn TextBackend>,
    cost: Arc<CostTracker>,
    settings: GenerationSettings,
}

impl GenerationClient {
    pub fn new(
        backend: Arc<dyn TextBackend>,
        cost: Arc<CostTracker>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            backend,
            cost,
            settings,
        }
    }

    pub fn cost(&self) -> &Arc<CostTracker> {
        &self.cost
    }

    /// The same backend and settings, accounting into `cost`.
    pub fn with_cost(&self, cost: Arc<CostTracker>) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            cost,
            settings: self.settings.clone(),
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Fails with a fatal config error when the backend lacks credentials.
    pub fn ensure_configured(&self) -> lectio_shared::Result<()> {
        self.backend.ensure_configured()
    }

    /// Estimated `(input, output)` tokens for a request.
    pub fn estimate(&self, operation: Operation, request: &CompletionRequest) -> (u64, u64) {
        let input = estimate_tokens(&request.system) + estimate_tokens(&request.user);
        let output = match operation {
            Operation::Synopsis => self.settings.synopsis_expected_output,
            Operation::Reflection => self.settings.reflection_expected_output,
        };
        (input, output.min(u64::from(request.max_tokens)))
    }

    /// Whether issuing `request` now would cross the budget ceiling.
    pub fn would_exceed(&self, operation: Operation, request: &CompletionRequest) -> bool {
        let (input, output) = self.estimate(operation, request);
        self.cost.would_exceed(input, output)
    }

    // -----------------------------------------------------------------------
    // Synopsis
    // -----------------------------------------------------------------------

    pub fn synopsis_request(&self, reading: &Reading) -> CompletionRequest {
        CompletionRequest::new(
            prompts::SYNOPSIS_SYSTEM_PROMPT,
            prompts::synopsis_prompt(reading),
            self.settings.synopsis_max_tokens,
        )
    }

    /// Generate a one-sentence synopsis of `reading`.
    #[instrument(skip_all, fields(reading = %reading.title))]
    pub async fn synopsis(&self, reading: &Reading) -> Result<ReadingSynopsis, GenerationError> {
        let operation = Operation::Synopsis;
        if reading.text.trim().is_empty() {
            return Err(GenerationError::InvalidInput {
                operation: operation.to_string(),
                message: format!("reading '{}' has no text", reading.title),
            });
        }

        let request = self.synopsis_request(reading);
        self.settings
            .corrective
            .run(
                operation.as_str(),
                request,
                move |request, attempt| async move { self.issue(operation, &request, attempt).await },
                |completion| response::parse_synopsis(completion, &reading.title),
                prompts::correction_note,
            )
            .await
    }

    // -----------------------------------------------------------------------
    // Reflection
    // -----------------------------------------------------------------------

    pub fn reflection_request(
        &self,
        readings: &[Reading],
        synopses: &[SynopsisEntry],
        context: &LiturgicalContext,
        feast: Option<&FeastInfo>,
    ) -> CompletionRequest {
        CompletionRequest::new(
            prompts::REFLECTION_SYSTEM_PROMPT,
            prompts::reflection_prompt(readings, synopses, context, feast),
            self.settings.reflection_max_tokens,
        )
    }

    /// Generate the unified reflection for the day.
    #[instrument(skip_all, fields(date = %context.date, readings = readings.len()))]
    pub async fn reflection(
        &self,
        readings: &[Reading],
        synopses: &[SynopsisEntry],
        context: &LiturgicalContext,
        feast: Option<&FeastInfo>,
    ) -> Result<Reflection, GenerationError> {
        if readings.is_empty() {
            return Err(GenerationError::InvalidInput {
                operation: Operation::Reflection.to_string(),
                message: "no readings to reflect on".into(),
            });
        }
        let request = self.reflection_request(readings, synopses, context, feast);
        self.reflection_from(request).await
    }

    /// Generate a reflection from a prepared request.
    pub async fn reflection_from(
        &self,
        request: CompletionRequest,
    ) -> Result<Reflection, GenerationError> {
        let operation = Operation::Reflection;
        self.settings
            .corrective
            .run(
                operation.as_str(),
                request,
                move |request, attempt| async move { self.issue(operation, &request, attempt).await },
                response::parse_reflection,
                prompts::correction_note,
            )
            .await
    }

    // -----------------------------------------------------------------------
    // Single call
    // -----------------------------------------------------------------------

    /// Reserve budget, call with backoff, record usage.
    async fn issue(
        &self,
        operation: Operation,
        request: &CompletionRequest,
        attempt: u32,
    ) -> Result<Completion, GenerationError> {
        if self.cost.exceeded() {
            return Err(GenerationError::BudgetExceeded {
                operation: operation.to_string(),
                estimated: 0.0,
                remaining: 0.0,
            });
        }

        let (input, output) = self.estimate(operation, request);
        let reservation = self.cost.try_reserve(input, output).map_err(|denied| {
            info!(
                operation = operation.as_str(),
                estimated = denied.estimated,
                remaining = denied.remaining,
                "call skipped by budget pre-flight"
            );
            GenerationError::BudgetExceeded {
                operation: operation.to_string(),
                estimated: denied.estimated,
                remaining: denied.remaining,
            }
        })?;
        debug!(
            operation = operation.as_str(),
            attempt,
            estimated_input = input,
            estimated_output = output,
            reserved = reservation.amount(),
            "issuing generation call"
        );

        let started = Instant::now();
        let outcome = with_backoff(&self.settings.backoff, operation.as_str(), move || {
            self.backend.complete(request)
        })
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(completion) => {
                let cost =
                    self.cost
                        .record(operation.as_str(), completion.input_tokens, completion.output_tokens);
                drop(reservation);
                info!(
                    operation = operation.as_str(),
                    attempt,
                    elapsed_ms,
                    input_tokens = completion.input_tokens,
                    output_tokens = completion.output_tokens,
                    cost,
                    "generation call completed"
                );
                Ok(completion)
            }
            Err(failure) => {
                warn!(
                    operation = operation.as_str(),
                    attempt,
                    elapsed_ms,
                    transport_attempts = failure.attempts,
                    error = %failure.error,
                    "generation call failed"
                );
                Err(GenerationError::Network {
                    operation: operation.to_string(),
                    attempts: failure.attempts,
                    message: failure.error.to_string(),
                })
            }
        }
    }
}
