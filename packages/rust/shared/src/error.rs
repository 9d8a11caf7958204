//! Error types for Lectio.
//!
//! Library crates use [`LectioError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Lectio operations.
#[derive(Debug, thiserror::Error)]
pub enum LectioError {
    /// Configuration loading or validation error. Fatal: aborts before any
    /// generation call is made.
    #[error("config error: {message}{}", hint.as_deref().map(|h| format!(" ({h})")).unwrap_or_default())]
    Config {
        message: String,
        /// Remediation hint shown to the operator.
        hint: Option<String>,
    },

    /// Network/HTTP error talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// Structurally invalid data (generated output, dataset entry, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A generation step was refused by the cost pre-flight check.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The liturgical calendar lookup failed or returned nothing usable.
    #[error("calendar lookup error: {0}")]
    CalendarLookup(String),

    /// JSON / TOML parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LectioError>;

impl LectioError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            hint: None,
        }
    }

    /// Create a config error carrying a remediation hint.
    pub fn config_with_hint(msg: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            hint: Some(hint.into()),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the run before any generation call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
