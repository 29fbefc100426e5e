//! Core types, configuration, and error handling for difftron.
//!
//! This crate provides the shared foundation used by all other difftron crates:
//! - [`DifftronError`]: unified error type using `thiserror`
//! - [`DifftronConfig`]: configuration loaded from `.difftron.toml`
//! - Shared types: [`Severity`], [`PathMatching`], [`OutputFormat`],
//!   [`Thresholds`], and the [`percentage`] helper

mod config;
mod error;
mod types;

pub use config::{AnalysisConfig, CoverageConfig, DifftronConfig, ThresholdConfig, Thresholds};
pub use error::DifftronError;
pub use types::{percentage, OutputFormat, PathMatching, Severity};
