//! Per-run token and dollar accounting against a spending ceiling.
//!
//! Every call is priced before it is issued ([`CostTracker::try_reserve`])
//! and recorded with actual usage once it returns ([`CostTracker::record`]).
//! Outstanding reservations count against the remaining budget, so
//! concurrently issued calls cannot jointly overrun the ceiling.

use std::sync::{Mutex, MutexGuard, PoisonError};

use lectio_shared::{BudgetConfig, CallRecord, CostSummary, LectioError, Result};
use tracing::{debug, warn};

/// Heuristic prompt-token estimate per whitespace-separated word.
const TOKENS_PER_WORD: f64 = 1.3;

/// Estimate the token count of `text` as `ceil(words × 1.3)`.
pub fn estimate_tokens(text: &str) -> u64 {
    let words = text.split_whitespace().count() as f64;
    (words * TOKENS_PER_WORD).ceil() as u64
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Dollar rates per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    }
}

impl From<&BudgetConfig> for Pricing {
    fn from(config: &BudgetConfig) -> Self {
        Self {
            input_per_million: config.input_cost_per_million,
            output_per_million: config.output_cost_per_million,
        }
    }
}

// ---------------------------------------------------------------------------
// CostTracker
// ---------------------------------------------------------------------------

/// Returned when a call would push the run past its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("estimated ${estimated:.4} exceeds remaining budget ${remaining:.4}")]
pub struct BudgetDenied {
    pub estimated: f64,
    pub remaining: f64,
}

#[derive(Debug, Default)]
struct Ledger {
    calls: Vec<CallRecord>,
    total_input_tokens: u64,
    total_output_tokens: u64,
    total_cost: f64,
    reserved: f64,
}

/// Accumulates usage for one run. Shared between concurrent generation
/// tasks behind an `Arc`.
#[derive(Debug)]
pub struct CostTracker {
    ceiling: f64,
    pricing: Pricing,
    ledger: Mutex<Ledger>,
}

impl CostTracker {
    /// Create a tracker; the ceiling must be a positive dollar amount.
    pub fn new(ceiling: f64, pricing: Pricing) -> Result<Self> {
        if !ceiling.is_finite() || ceiling <= 0.0 {
            return Err(LectioError::config(format!(
                "budget ceiling must be a positive amount, got {ceiling}"
            )));
        }
        Ok(Self {
            ceiling,
            pricing,
            ledger: Mutex::new(Ledger::default()),
        })
    }

    pub fn from_config(config: &BudgetConfig) -> Result<Self> {
        Self::new(config.ceiling_usd, Pricing::from(config))
    }

    /// An empty tracker with the same ceiling and pricing, for a new run.
    pub fn fresh(&self) -> Self {
        Self {
            ceiling: self.ceiling,
            pricing: self.pricing,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    /// Token estimate for a prompt.
    pub fn estimate(&self, text: &str) -> u64 {
        estimate_tokens(text)
    }

    /// Price of a call with the given token counts.
    pub fn cost_of(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        self.pricing.cost(input_tokens, output_tokens)
    }

    /// Whether a call of this size would cross the ceiling, counting
    /// recorded spend and outstanding reservations.
    pub fn would_exceed(&self, estimated_input: u64, estimated_output: u64) -> bool {
        let estimated = self.cost_of(estimated_input, estimated_output);
        let ledger = self.ledger();
        ledger.total_cost + ledger.reserved + estimated > self.ceiling
    }

    /// Hold budget for a call about to be issued. The hold is released when
    /// the returned [`Reservation`] drops.
    pub fn try_reserve(
        &self,
        estimated_input: u64,
        estimated_output: u64,
    ) -> std::result::Result<Reservation<'_>, BudgetDenied> {
        let estimated = self.cost_of(estimated_input, estimated_output);
        let mut ledger = self.ledger();
        let remaining = self.ceiling - ledger.total_cost - ledger.reserved;
        if estimated > remaining {
            debug!(estimated, remaining, "budget reservation denied");
            return Err(BudgetDenied {
                estimated,
                remaining: remaining.max(0.0),
            });
        }
        ledger.reserved += estimated;
        Ok(Reservation {
            tracker: self,
            amount: estimated,
        })
    }

    /// Record actual usage of a completed call and return its cost.
    ///
    /// Never rejects: a call that was already billed is always recorded,
    /// even when actual usage pushes the total past the ceiling.
    pub fn record(&self, operation: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let cost = self.cost_of(input_tokens, output_tokens);
        let mut ledger = self.ledger();
        ledger.total_input_tokens += input_tokens;
        ledger.total_output_tokens += output_tokens;
        ledger.total_cost += cost;
        ledger.calls.push(CallRecord {
            operation: operation.to_string(),
            input_tokens,
            output_tokens,
            cost,
        });
        if ledger.total_cost > self.ceiling {
            warn!(
                operation,
                total_cost = ledger.total_cost,
                ceiling = self.ceiling,
                "actual usage exceeded the budget ceiling"
            );
        }
        cost
    }

    pub fn total_cost(&self) -> f64 {
        self.ledger().total_cost
    }

    pub fn api_calls(&self) -> usize {
        self.ledger().calls.len()
    }

    /// True once recorded spend is over the ceiling.
    pub fn exceeded(&self) -> bool {
        self.ledger().total_cost > self.ceiling
    }

    /// Budget left after recorded spend and outstanding reservations.
    pub fn remaining(&self) -> f64 {
        let ledger = self.ledger();
        (self.ceiling - ledger.total_cost - ledger.reserved).max(0.0)
    }

    /// Snapshot of recorded usage.
    pub fn summary(&self) -> CostSummary {
        let ledger = self.ledger();
        CostSummary {
            total_input_tokens: ledger.total_input_tokens,
            total_output_tokens: ledger.total_output_tokens,
            total_cost: ledger.total_cost,
            ceiling: self.ceiling,
            exceeded_budget: ledger.total_cost > self.ceiling,
            api_calls_count: ledger.calls.len(),
            calls: ledger.calls.clone(),
        }
    }

    fn release(&self, amount: f64) {
        let mut ledger = self.ledger();
        ledger.reserved = (ledger.reserved - amount).max(0.0);
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // Plain counters; a poisoned lock still holds usable totals.
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Budget held for an in-flight call.
#[derive(Debug)]
pub struct Reservation<'a> {
    tracker: &'a CostTracker,
    amount: f64,
}

impl Reservation<'_> {
    pub fn amount(&self) -> f64 {
        self.amount
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.tracker.release(self.amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn tracker(ceiling: f64) -> CostTracker {
        CostTracker::new(ceiling, Pricing::default()).unwrap()
    }

    #[test]
    fn estimates_tokens_from_words() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one two three"), 4);
        assert_eq!(estimate_tokens("a b c d e f g h i j"), 13);
    }

    #[test]
    fn prices_with_default_rates() {
        let pricing = Pricing::default();
        assert!(close(pricing.cost(1_000_000, 0), 3.0));
        assert!(close(pricing.cost(0, 1_000_000), 15.0));
        assert!(close(pricing.cost(1_000, 500), 0.0105));
    }

    #[test]
    fn rejects_non_positive_ceiling() {
        assert!(CostTracker::new(0.0, Pricing::default()).is_err());
        assert!(CostTracker::new(-1.0, Pricing::default()).is_err());
        assert!(CostTracker::new(f64::NAN, Pricing::default()).is_err());
    }

    #[test]
    fn record_accumulates_and_summarizes() {
        let tracker = tracker(0.04);
        tracker.record("synopsis", 200, 40);
        tracker.record("reflection", 1_000, 600);

        let summary = tracker.summary();
        assert_eq!(summary.api_calls_count, 2);
        assert_eq!(summary.total_input_tokens, 1_200);
        assert_eq!(summary.total_output_tokens, 640);
        assert!(close(summary.total_cost, 0.0036 + 0.0096));
        assert!(!summary.exceeded_budget);
        assert_eq!(summary.calls[1].operation, "reflection");
    }

    #[test]
    fn would_exceed_compares_against_remaining() {
        let tracker = tracker(0.01);
        assert!(!tracker.would_exceed(1_000, 400));
        tracker.record("synopsis", 1_000, 400);
        assert!(tracker.would_exceed(1_000, 400));
    }

    #[test]
    fn reservations_hold_budget_until_dropped() {
        let tracker = tracker(0.01);
        // Each call estimated at $0.006.
        let first = tracker.try_reserve(0, 400).unwrap();
        assert!(close(first.amount(), 0.006));
        let denied = tracker.try_reserve(0, 400).unwrap_err();
        assert!(close(denied.remaining, 0.004));

        drop(first);
        assert!(tracker.try_reserve(0, 400).is_ok());
        assert!(close(tracker.remaining(), 0.01));
    }

    #[test]
    fn record_never_rejects_and_marks_exceeded() {
        let tracker = tracker(0.01);
        let cost = tracker.record("reflection", 0, 1_000);
        assert!(close(cost, 0.015));
        assert!(tracker.exceeded());
        assert!(tracker.summary().exceeded_budget);
        assert!(close(tracker.remaining(), 0.0));
        assert!(tracker.try_reserve(1, 1).is_err());
    }

    #[test]
    fn fresh_tracker_keeps_limits_but_not_usage() {
        let tracker = tracker(0.01);
        tracker.record("reflection", 0, 1_000);

        let next = tracker.fresh();
        assert!(close(next.ceiling(), 0.01));
        assert_eq!(next.pricing(), tracker.pricing());
        assert_eq!(next.api_calls(), 0);
        assert!(!next.exceeded());
        assert!(close(next.remaining(), 0.01));
    }
}
