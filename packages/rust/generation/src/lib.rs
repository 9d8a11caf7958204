//! Text-generation client for Lectio.
//!
//! Wraps the external text-generation service behind the [`TextBackend`]
//! trait, validates the JSON it returns, and composes two retry concerns:
//! transport backoff ([`retry::with_backoff`]) and corrective re-prompting
//! ([`retry::CorrectiveRetry`]). Every billed call is recorded in the per-run
//! [`CostTracker`].

pub mod backend;
pub mod client;
pub mod cost;
pub mod error;
pub mod prompts;
pub mod response;
pub mod retry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{AnthropicBackend, BackendError, Completion, CompletionRequest, TextBackend};
pub use client::{GenerationClient, GenerationSettings, Operation};
pub use cost::{BudgetDenied, CostTracker, Pricing, Reservation, estimate_tokens};
pub use error::GenerationError;
pub use response::Violation;
pub use retry::{BackoffPolicy, CorrectiveRetry};
