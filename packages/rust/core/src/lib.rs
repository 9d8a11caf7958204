//! Pipeline orchestration for Lectio.
//!
//! This crate ties generation, calendar lookup and prayer selection into a
//! single run that produces an [`AugmentedBundle`](lectio_shared::AugmentedBundle),
//! and persists bundles for the site renderer.

pub mod orchestrator;
pub mod persist;

pub use orchestrator::{PipelineState, ProgressReporter, ReflectionOrchestrator, SilentProgress};
pub use persist::{bundle_path, read_bundle, write_bundle};
