//! Change coverage: how much of what a diff touched is exercised by tests.
//!
//! Joins a [`difftron_difflens::parser::ChangeSet`] with a
//! [`difftron_coverage::CoverageReport`] line by line, optionally comparing
//! against a baseline report from before the change.

pub mod analyzer;

pub use analyzer::{analyze, analyze_file, AnalysisResult, AnalyzeOptions, FileResult, FileTypeMetrics};
