//! Shared types, error model, and configuration for Lectio.
//!
//! This crate is the foundation depended on by all other Lectio crates.
//! It provides:
//! - [`LectioError`], the unified error type
//! - Domain types ([`Reading`], [`Reflection`], [`AugmentedBundle`], [`LiturgicalContext`], ...)
//! - Configuration ([`AppConfig`], config loading, credential checks)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BudgetConfig, CalendarConfig, CalendarSourceKind, CitationsConfig,
    GenerationConfig, OutputConfig, PrayersConfig, RetryConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{LectioError, Result};
pub use types::{
    AugmentedBundle, AugmentedContent, BundleId, BundleOutcome, BundleStatus, CallRecord,
    Citation, CostSummary, FeastInfo, FeastType, LiturgicalContext, MissingPart, PipelineStep,
    Rank, Reading, ReadingSynopsis, Reflection, SaintBio, Season, SourceName, SourcedPrayer,
    SynopsisEntry, CATECHISM_MAX_PARAGRAPH, CATECHISM_MIN_PARAGRAPH, is_catechism_paragraph,
};
