//! Runtime configuration shared by the field pipeline crates.
//!
//! Three concerns live here: tracing subscriber setup, deterministic seeding
//! for sample splits, and the declarative [`pipeline::PipelineConfig`] read
//! by the command line tooling.

pub mod determinism;
pub mod pipeline;
pub mod tracing;

pub use pipeline::{ArchiveModeSetting, ConfigError, PipelineConfig, ScalerScopeSetting};
