//! Errors surfaced by the generation client.

use lectio_shared::LectioError;

use crate::response::Violation;

/// Failure of a single generation step (one synopsis or the reflection).
///
/// None of these abort a run: the orchestrator degrades the affected field.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Transport retries exhausted, or the service rejected the request.
    #[error("{operation}: service unavailable after {attempts} attempt(s): {message}")]
    Network {
        operation: String,
        attempts: u32,
        message: String,
    },

    /// Corrective retries exhausted without structurally valid output.
    #[error("{operation}: invalid output after {attempts} attempt(s): {violation}")]
    Validation {
        operation: String,
        attempts: u32,
        violation: Violation,
    },

    /// The cost pre-flight refused the call; nothing was sent.
    #[error(
        "{operation}: skipped, estimated ${estimated:.4} exceeds remaining budget ${remaining:.4}"
    )]
    BudgetExceeded {
        operation: String,
        estimated: f64,
        remaining: f64,
    },

    /// The input cannot be turned into a request.
    #[error("{operation}: invalid input: {message}")]
    InvalidInput { operation: String, message: String },
}

impl GenerationError {
    /// Attempts made before giving up (0 when no call was issued).
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Network { attempts, .. } | Self::Validation { attempts, .. } => *attempts,
            Self::BudgetExceeded { .. } | Self::InvalidInput { .. } => 0,
        }
    }

    pub fn is_budget(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }
}

impl From<GenerationError> for LectioError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Network { .. } => LectioError::Network(err.to_string()),
            GenerationError::BudgetExceeded { .. } => LectioError::BudgetExceeded(err.to_string()),
            GenerationError::Validation { .. } | GenerationError::InvalidInput { .. } => {
                LectioError::validation(err.to_string())
            }
        }
    }
}
