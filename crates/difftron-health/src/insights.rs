//! Rule pass turning health numbers into findings.
//!
//! Output order is fixed: the global verdict, then regressions, then test
//! gaps, each in file path order. Recommendations list regressions before
//! files that are merely below threshold.

use std::collections::{BTreeMap, BTreeSet};

use difftron_core::{Severity, Thresholds};
use serde::Serialize;

use crate::health::FileHealth;
use crate::suite::SuiteKind;

/// Tone of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    /// The change meets its coverage threshold.
    Success,
    /// Advisory, such as a change exercised by a single kind of suite.
    Info,
    /// Coverage below threshold or changed lines left untested.
    Warning,
    /// A coverage regression against the baseline.
    Error,
}

/// What an insight is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightCategory {
    /// Overall changed-line coverage.
    Coverage,
    /// Coverage dropped relative to the baseline.
    Regression,
    /// Changed code no suite, or only one kind of suite, exercises.
    TestGap,
}

/// A single finding about the change.
///
/// # Examples
///
/// ```
/// use difftron_core::Severity;
/// use difftron_health::{Insight, InsightCategory, InsightKind};
///
/// let insight = Insight {
///     kind: InsightKind::Warning,
///     category: InsightCategory::TestGap,
///     title: "No test coverage for changed lines".into(),
///     description: "src/a.rs has 2 uncovered changed lines".into(),
///     file: Some("src/a.rs".into()),
///     line_numbers: vec![4, 5],
///     severity: Severity::High,
/// };
/// assert_eq!(serde_json::to_value(&insight).unwrap()["category"], "test-gap");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    /// Tone.
    #[serde(rename = "type")]
    pub kind: InsightKind,
    /// Subject.
    pub category: InsightCategory,
    /// One-line summary.
    pub title: String,
    /// Details with the relevant numbers.
    pub description: String,
    /// File the insight is about, if it is about one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Lines the insight is about.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub line_numbers: Vec<u32>,
    /// How urgent it is.
    pub severity: Severity,
}

/// What a recommendation asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationCategory {
    /// Write tests for files below threshold.
    AddTests,
    /// Restore coverage in files that regressed.
    FixRegression,
}

/// An action covering a group of files.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// How soon to act.
    pub priority: Severity,
    /// Kind of action.
    pub category: RecommendationCategory,
    /// One-line summary.
    pub title: String,
    /// Details with the file count.
    pub description: String,
    /// The concrete step to take.
    pub action: String,
    /// Affected files in path order.
    pub files: Vec<String>,
    /// Kind of test that would help most.
    pub suite_kind: SuiteKind,
}

pub(crate) fn generate_insights(
    files: &BTreeMap<String, FileHealth>,
    changed_coverage: f64,
    thresholds: &Thresholds,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    if changed_coverage >= thresholds.overall {
        insights.push(Insight {
            kind: InsightKind::Success,
            category: InsightCategory::Coverage,
            title: "Coverage threshold met".into(),
            description: format!(
                "Overall change coverage is {changed_coverage:.1}%, meeting the {:.1}% threshold",
                thresholds.overall
            ),
            file: None,
            line_numbers: Vec::new(),
            severity: Severity::Low,
        });
    } else {
        insights.push(Insight {
            kind: InsightKind::Warning,
            category: InsightCategory::Coverage,
            title: "Coverage below threshold".into(),
            description: format!(
                "Overall change coverage is {changed_coverage:.1}%, below the {:.1}% threshold",
                thresholds.overall
            ),
            file: None,
            line_numbers: Vec::new(),
            severity: Severity::High,
        });
    }

    for file in files.values().filter(|f| f.has_regression) {
        let baseline = file.baseline_coverage_percentage.unwrap_or(0.0);
        insights.push(Insight {
            kind: InsightKind::Error,
            category: InsightCategory::Regression,
            title: format!("Coverage regression in {}", file.path),
            description: format!(
                "Changed-line coverage dropped from {baseline:.1}% to {:.1}%, below the {:.1}% threshold",
                file.changed_coverage_percentage, file.threshold
            ),
            file: Some(file.path.clone()),
            line_numbers: file.uncovered_line_numbers.clone(),
            severity: Severity::Critical,
        });
    }

    for file in files.values().filter(|f| f.changed_uncovered_lines > 0) {
        if file.changed_covered_lines == 0 {
            insights.push(Insight {
                kind: InsightKind::Warning,
                category: InsightCategory::TestGap,
                title: "No test coverage for changed lines".into(),
                description: format!(
                    "{} has {} uncovered changed lines",
                    file.path, file.changed_uncovered_lines
                ),
                file: Some(file.path.clone()),
                line_numbers: file.uncovered_line_numbers.clone(),
                severity: Severity::High,
            });
            continue;
        }

        let kinds: BTreeSet<SuiteKind> = file
            .suites
            .values()
            .filter(|s| s.covered_lines > 0)
            .map(|s| s.kind)
            .collect();
        if kinds.len() != 1 {
            continue;
        }
        if let Some(&only) = kinds.first() {
            let title = match only {
                SuiteKind::Unit => "Unit tests only, consider integration tests".to_string(),
                other => format!("Only {other} tests cover these changes, consider unit tests"),
            };
            insights.push(Insight {
                kind: InsightKind::Info,
                category: InsightCategory::TestGap,
                title,
                description: format!(
                    "{} is covered by {only} tests only, with {} changed lines uncovered",
                    file.path, file.changed_uncovered_lines
                ),
                file: Some(file.path.clone()),
                line_numbers: file.uncovered_line_numbers.clone(),
                severity: Severity::Medium,
            });
        }
    }

    insights
}

pub(crate) fn generate_recommendations(files: &BTreeMap<String, FileHealth>) -> Vec<Recommendation> {
    let regressing: Vec<String> = files
        .values()
        .filter(|f| f.has_regression)
        .map(|f| f.path.clone())
        .collect();
    let below: Vec<String> = files
        .values()
        .filter(|f| !f.has_regression && f.changed_coverage_percentage < f.threshold)
        .map(|f| f.path.clone())
        .collect();

    let mut recommendations = Vec::new();
    if !regressing.is_empty() {
        recommendations.push(Recommendation {
            priority: Severity::Critical,
            category: RecommendationCategory::FixRegression,
            title: "Fix coverage regression".into(),
            description: format!("{} file(s) have coverage below baseline", regressing.len()),
            action: "Restore test coverage to baseline levels".into(),
            files: regressing,
            suite_kind: SuiteKind::Unit,
        });
    }
    if !below.is_empty() {
        recommendations.push(Recommendation {
            priority: Severity::High,
            category: RecommendationCategory::AddTests,
            title: "Add tests for uncovered changes".into(),
            description: format!(
                "{} file(s) have changes below coverage threshold",
                below.len()
            ),
            action: "Add unit tests for uncovered changed lines".into(),
            files: below,
            suite_kind: SuiteKind::Unit,
        });
    }
    recommendations
}
