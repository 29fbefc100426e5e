//! Change coverage across several test suites.
//!
//! Each suite (unit, API, functional, ...) contributes its own coverage
//! artifact. The suites are merged into one view of what any test
//! exercised, per-suite contributions are kept for every changed file, and a
//! fixed rule pass turns the numbers into insights and recommendations.

pub mod aggregate;
pub mod health;
pub mod insights;
pub mod suite;

pub use aggregate::aggregate;
pub use health::{analyze_health, FileHealth, HealthReport, SuiteChangeCoverage, SuiteSummary};
pub use insights::{Insight, InsightCategory, InsightKind, Recommendation, RecommendationCategory};
pub use suite::{detect_suite_kind, SuiteKind, SuiteReport};
