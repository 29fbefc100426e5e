use std::collections::BTreeMap;

use difftron_analyzer::{analyze_file, AnalyzeOptions, FileTypeMetrics};
use difftron_core::{percentage, DifftronError, Thresholds};
use difftron_coverage::paths::lookup;
use difftron_coverage::CoverageReport;
use difftron_difflens::parser::{ChangeSet, FileChange};
use serde::Serialize;

use crate::aggregate::aggregate;
use crate::insights::{generate_insights, generate_recommendations, Insight, Recommendation};
use crate::suite::{SuiteKind, SuiteReport};

/// How much of a file's change one suite covered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteChangeCoverage {
    /// Kind of the suite.
    pub kind: SuiteKind,
    /// Changed lines this suite executed.
    pub covered_lines: usize,
    /// `covered_lines` over the file's changed lines.
    pub coverage_percentage: f64,
}

/// Health of one changed file across every suite.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHealth {
    /// Path as it appears in the diff.
    pub path: String,
    /// The diff created this file.
    pub is_new_file: bool,
    /// Threshold applied to this file.
    pub threshold: f64,

    /// Instrumented lines in the whole file, from merged coverage.
    pub total_lines: usize,
    /// Covered lines in the whole file.
    pub covered_lines: usize,
    /// Uncovered lines in the whole file.
    pub uncovered_lines: usize,
    /// Whole-file coverage percentage.
    pub coverage_percentage: f64,

    /// Lines the diff changed.
    pub changed_lines: usize,
    /// Changed lines any suite executed.
    pub changed_covered_lines: usize,
    /// Changed lines no suite executed.
    pub changed_uncovered_lines: usize,
    /// Change coverage percentage.
    pub changed_coverage_percentage: f64,
    /// Covered changed lines, ascending.
    pub covered_line_numbers: Vec<u32>,
    /// Uncovered changed lines, ascending.
    pub uncovered_line_numbers: Vec<u32>,

    /// Per-suite breakdown keyed by suite name.
    pub suites: BTreeMap<String, SuiteChangeCoverage>,

    /// Baseline change coverage of the same lines, for modified files.
    pub baseline_coverage_percentage: Option<f64>,
    /// Current minus baseline change coverage.
    pub coverage_delta: Option<f64>,
    /// Coverage dropped against the baseline and sits below threshold.
    pub has_regression: bool,
    /// Below threshold, or regressing.
    pub needs_attention: bool,
}

/// Project-wide and change numbers for one suite.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteSummary {
    /// Suite name.
    pub name: String,
    /// Suite kind.
    pub kind: SuiteKind,
    /// Where the coverage came from.
    pub source: String,
    /// Instrumented lines the suite reports.
    pub total_lines: usize,
    /// Covered lines the suite reports.
    pub covered_lines: usize,
    /// Project coverage by this suite alone.
    pub coverage_percentage: f64,
    /// Changed lines this suite executed.
    pub changed_covered_lines: usize,
    /// Change coverage by this suite alone.
    pub changed_coverage_percentage: f64,
}

/// The multi-suite view of a change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Files in the merged coverage.
    pub total_files: usize,
    /// Instrumented lines in the merged coverage.
    pub total_lines: usize,
    /// Covered lines in the merged coverage.
    pub total_covered_lines: usize,
    /// Uncovered lines in the merged coverage.
    pub total_uncovered_lines: usize,
    /// Project coverage percentage.
    pub overall_coverage: f64,

    /// Files with changed lines.
    pub changed_files: usize,
    /// Changed lines across the diff.
    pub changed_lines: usize,
    /// Changed lines any suite executed.
    pub changed_covered_lines: usize,
    /// Changed lines no suite executed.
    pub changed_uncovered_lines: usize,
    /// Change coverage percentage.
    pub changed_coverage: f64,

    /// Files the diff created.
    pub new_files: FileTypeMetrics,
    /// Files the diff modified.
    pub modified_files: FileTypeMetrics,

    /// One entry per suite, in input order.
    pub suites: Vec<SuiteSummary>,
    /// Per-file health keyed by diff path.
    pub files: BTreeMap<String, FileHealth>,

    /// Files meeting their threshold.
    pub healthy_files: usize,
    /// Files below their threshold.
    pub at_risk_files: usize,
    /// Files regressing against the baseline.
    pub regressing_files: usize,

    /// Findings, in a fixed order.
    pub insights: Vec<Insight>,
    /// Actions, regressions first.
    pub recommendations: Vec<Recommendation>,

    /// Thresholds the report was computed against.
    pub thresholds: Thresholds,
    /// Some suite only had function-level data.
    pub approximate: bool,
}

impl HealthReport {
    /// Whether overall change coverage meets the overall threshold.
    pub fn meets_threshold(&self) -> bool {
        self.changed_coverage >= self.thresholds.overall
    }

    /// Whether the new and modified subsets meet their thresholds.
    pub fn meets_thresholds(&self) -> bool {
        self.new_files.meets(self.thresholds.new_files)
            && self.modified_files.meets(self.thresholds.modified_files)
    }
}

/// Build a [`HealthReport`] for `change_set` from one or more suites.
///
/// Baseline suites are optional; pass an empty slice to skip regression
/// detection.
///
/// # Errors
///
/// Returns [`DifftronError::InvalidInput`] if the change set is missing or
/// `suites` is empty.
///
/// # Examples
///
/// ```
/// use difftron_analyzer::AnalyzeOptions;
/// use difftron_core::Thresholds;
/// use difftron_coverage::lcov;
/// use difftron_difflens::parser::parse_unified_diff;
/// use difftron_health::{analyze_health, SuiteReport};
///
/// let diff = "--- a/f.rs\n+++ b/f.rs\n@@ -5,3 +5,5 @@\n a\n+b\n+c\n d\n";
/// let changes = parse_unified_diff(diff).unwrap();
/// let unit = lcov::parse("SF:f.rs\nDA:6,1\nDA:7,0\nend_of_record\n").unwrap();
/// let api = lcov::parse("SF:f.rs\nDA:7,2\nend_of_record\n").unwrap();
/// let suites = [
///     SuiteReport::new("unit", unit, "unit.info"),
///     SuiteReport::new("api", api, "api.info"),
/// ];
///
/// let report = analyze_health(
///     Some(&changes),
///     &suites,
///     &[],
///     &Thresholds::uniform(80.0),
///     &AnalyzeOptions::default(),
/// )
/// .unwrap();
/// assert_eq!(report.changed_coverage, 100.0);
/// assert!(report.meets_threshold());
/// ```
pub fn analyze_health(
    change_set: Option<&ChangeSet>,
    suites: &[SuiteReport],
    baseline_suites: &[SuiteReport],
    thresholds: &Thresholds,
    options: &AnalyzeOptions,
) -> Result<HealthReport, DifftronError> {
    let change_set =
        change_set.ok_or_else(|| DifftronError::InvalidInput("change set is required".into()))?;
    if suites.is_empty() {
        return Err(DifftronError::InvalidInput(
            "at least one suite coverage report is required".into(),
        ));
    }

    let current = aggregate(suites);
    let baseline = (!baseline_suites.is_empty()).then(|| aggregate(baseline_suites));

    let totals = current.totals();
    let mut report = HealthReport {
        total_files: current.len(),
        total_lines: totals.total_lines,
        total_covered_lines: totals.covered_lines,
        total_uncovered_lines: totals.total_lines.saturating_sub(totals.covered_lines),
        overall_coverage: totals.percentage(),
        changed_files: 0,
        changed_lines: 0,
        changed_covered_lines: 0,
        changed_uncovered_lines: 0,
        changed_coverage: 0.0,
        new_files: FileTypeMetrics::default(),
        modified_files: FileTypeMetrics::default(),
        suites: Vec::new(),
        files: BTreeMap::new(),
        healthy_files: 0,
        at_risk_files: 0,
        regressing_files: 0,
        insights: Vec::new(),
        recommendations: Vec::new(),
        thresholds: *thresholds,
        approximate: current.is_approximate() || baseline.as_ref().is_some_and(|b| b.is_approximate()),
    };

    for change in change_set.changed_files() {
        let health = file_health(change, &current, baseline.as_ref(), suites, thresholds, options);
        report.record_file(health);
    }
    report.changed_coverage = percentage(report.changed_covered_lines, report.changed_lines);
    report.suites = summarize_suites(suites, &report.files);

    report.insights = generate_insights(&report.files, report.changed_coverage, thresholds);
    report.recommendations = generate_recommendations(&report.files);

    tracing::debug!(
        suites = suites.len(),
        files = report.changed_files,
        changed_coverage = report.changed_coverage,
        regressing = report.regressing_files,
        "analyzed change health"
    );
    Ok(report)
}

impl HealthReport {
    fn record_file(&mut self, health: FileHealth) {
        self.changed_files += 1;
        self.changed_lines += health.changed_lines;
        self.changed_covered_lines += health.changed_covered_lines;
        self.changed_uncovered_lines += health.changed_uncovered_lines;

        let subset = if health.is_new_file {
            &mut self.new_files
        } else {
            &mut self.modified_files
        };
        subset.total_changed_lines += health.changed_lines;
        subset.covered_lines += health.changed_covered_lines;
        subset.uncovered_lines += health.changed_uncovered_lines;
        subset.file_count += 1;
        subset.coverage_percentage = percentage(subset.covered_lines, subset.total_changed_lines);

        if health.changed_coverage_percentage >= health.threshold {
            self.healthy_files += 1;
        } else {
            self.at_risk_files += 1;
        }
        if health.has_regression {
            self.regressing_files += 1;
        }
        self.files.insert(health.path.clone(), health);
    }
}

fn file_health(
    change: &FileChange,
    current: &CoverageReport,
    baseline: Option<&CoverageReport>,
    suites: &[SuiteReport],
    thresholds: &Thresholds,
    options: &AnalyzeOptions,
) -> FileHealth {
    let result = analyze_file(change, current, baseline, options);
    let threshold = thresholds.for_file(change.is_new_file);

    let (total_lines, covered_lines) = result
        .coverage_key
        .as_deref()
        .and_then(|key| current.record(key))
        .map_or((0, 0), |r| (r.total_lines(), r.covered_lines()));

    let mut per_suite = BTreeMap::new();
    for suite in suites {
        let record = lookup(&suite.report, &change.path, &options.repo_root, options.path_matching)
            .map(|(_, record)| record);
        let covered = record.map_or(0, |r| {
            result
                .covered_line_numbers
                .iter()
                .filter(|&&line| r.is_line_covered(line))
                .count()
        });
        per_suite.insert(
            suite.name.clone(),
            SuiteChangeCoverage {
                kind: suite.kind,
                covered_lines: covered,
                coverage_percentage: percentage(covered, result.total_changed_lines),
            },
        );
    }

    let coverage_delta = result
        .baseline_coverage_percentage
        .map(|base| result.coverage_percentage - base);
    let has_regression =
        coverage_delta.is_some_and(|d| d < 0.0) && result.coverage_percentage < threshold;
    let needs_attention = result.coverage_percentage < threshold || has_regression;

    FileHealth {
        path: result.path,
        is_new_file: result.is_new_file,
        threshold,
        total_lines,
        covered_lines,
        uncovered_lines: total_lines.saturating_sub(covered_lines),
        coverage_percentage: percentage(covered_lines, total_lines),
        changed_lines: result.total_changed_lines,
        changed_covered_lines: result.covered_lines,
        changed_uncovered_lines: result.uncovered_lines,
        changed_coverage_percentage: result.coverage_percentage,
        covered_line_numbers: result.covered_line_numbers,
        uncovered_line_numbers: result.uncovered_line_numbers,
        suites: per_suite,
        baseline_coverage_percentage: result.baseline_coverage_percentage,
        coverage_delta,
        has_regression,
        needs_attention,
    }
}

fn summarize_suites(
    suites: &[SuiteReport],
    files: &BTreeMap<String, FileHealth>,
) -> Vec<SuiteSummary> {
    let changed_lines: usize = files.values().map(|f| f.changed_lines).sum();
    suites
        .iter()
        .map(|suite| {
            let totals = suite.report.totals();
            let changed_covered_lines = files
                .values()
                .filter_map(|f| f.suites.get(&suite.name))
                .map(|s| s.covered_lines)
                .sum();
            SuiteSummary {
                name: suite.name.clone(),
                kind: suite.kind,
                source: suite.source.clone(),
                total_lines: totals.total_lines,
                covered_lines: totals.covered_lines,
                coverage_percentage: totals.percentage(),
                changed_covered_lines,
                changed_coverage_percentage: percentage(changed_covered_lines, changed_lines),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::{InsightCategory, InsightKind, RecommendationCategory};
    use difftron_core::Severity;
    use difftron_coverage::lcov;

    fn suite(name: &str, text: &str) -> SuiteReport {
        SuiteReport::new(name, lcov::parse(text).unwrap(), format!("{name}.info"))
    }

    fn run(
        changes: &ChangeSet,
        suites: &[SuiteReport],
        baseline: &[SuiteReport],
        threshold: f64,
    ) -> HealthReport {
        analyze_health(
            Some(changes),
            suites,
            baseline,
            &Thresholds::uniform(threshold),
            &AnalyzeOptions::default(),
        )
        .unwrap()
    }

    fn modified(path: &str, lines: &[u32]) -> FileChange {
        FileChange::new(path, false).with_added_lines(lines.iter().copied())
    }

    #[test]
    fn missing_inputs_are_invalid() {
        let changes = ChangeSet::default();
        let opts = AnalyzeOptions::default();
        let t = Thresholds::default();
        assert!(matches!(
            analyze_health(None, &[suite("unit", "")], &[], &t, &opts),
            Err(DifftronError::InvalidInput(_))
        ));
        assert!(matches!(
            analyze_health(Some(&changes), &[], &[], &t, &opts),
            Err(DifftronError::InvalidInput(_))
        ));
    }

    #[test]
    fn unchanged_baseline_is_not_a_regression() {
        let changes: ChangeSet = [modified("f.rs", &[6, 7])].into_iter().collect();
        let current = [suite("unit", "SF:f.rs\nDA:6,1\nDA:7,0\nend_of_record\n")];
        let baseline = [suite("unit", "SF:f.rs\nDA:6,3\nDA:7,0\nend_of_record\n")];
        let report = run(&changes, &current, &baseline, 80.0);

        let file = &report.files["f.rs"];
        assert_eq!(file.baseline_coverage_percentage, Some(50.0));
        assert_eq!(file.coverage_delta, Some(0.0));
        assert!(!file.has_regression);
        assert!(file.needs_attention);
        assert_eq!(report.regressing_files, 0);
    }

    #[test]
    fn drop_below_threshold_is_a_regression() {
        let changes: ChangeSet = [modified("f.rs", &[1, 2])].into_iter().collect();
        let current = [suite("unit", "SF:f.rs\nDA:1,1\nDA:2,0\nend_of_record\n")];
        let baseline = [suite("unit", "SF:f.rs\nDA:1,1\nDA:2,1\nend_of_record\n")];
        let report = run(&changes, &current, &baseline, 80.0);

        let file = &report.files["f.rs"];
        assert_eq!(file.coverage_delta, Some(-50.0));
        assert!(file.has_regression);
        assert_eq!(report.regressing_files, 1);

        let regression = report
            .insights
            .iter()
            .find(|i| i.category == InsightCategory::Regression)
            .unwrap();
        assert_eq!(regression.severity, Severity::Critical);
        assert!(regression.description.contains("100.0%"));
        assert!(regression.description.contains("50.0%"));

        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(
            report.recommendations[0].category,
            RecommendationCategory::FixRegression
        );
    }

    #[test]
    fn drop_above_threshold_is_not_a_regression() {
        let changes: ChangeSet = [modified("f.rs", &[1, 2, 3, 4])].into_iter().collect();
        let current = [suite("unit", "SF:f.rs\nDA:1,1\nDA:2,1\nDA:3,1\nDA:4,0\nend_of_record\n")];
        let baseline = [suite("unit", "SF:f.rs\nDA:1,1\nDA:2,1\nDA:3,1\nDA:4,1\nend_of_record\n")];
        let report = run(&changes, &current, &baseline, 70.0);
        let file = &report.files["f.rs"];
        assert_eq!(file.coverage_delta, Some(-25.0));
        assert!(!file.has_regression);
        assert!(!file.needs_attention);
    }

    #[test]
    fn new_files_get_no_baseline() {
        let changes: ChangeSet = [FileChange::new("n.rs", true).with_added_lines([1])]
            .into_iter()
            .collect();
        let current = [suite("unit", "SF:n.rs\nDA:1,0\nend_of_record\n")];
        let baseline = [suite("unit", "SF:n.rs\nDA:1,1\nend_of_record\n")];
        let report = run(&changes, &current, &baseline, 80.0);
        let file = &report.files["n.rs"];
        assert_eq!(file.baseline_coverage_percentage, None);
        assert_eq!(file.coverage_delta, None);
        assert!(!file.has_regression);
        assert_eq!(report.new_files.file_count, 1);
    }

    #[test]
    fn per_suite_breakdown_counts_covered_changed_lines() {
        let changes: ChangeSet = [modified("f.rs", &[1, 2, 3])].into_iter().collect();
        let suites = [
            suite("unit", "SF:f.rs\nDA:1,1\nDA:2,0\nDA:3,0\nend_of_record\n"),
            suite("api", "SF:f.rs\nDA:1,1\nDA:2,5\nend_of_record\n"),
        ];
        let report = run(&changes, &suites, &[], 50.0);
        let file = &report.files["f.rs"];
        assert_eq!(file.changed_covered_lines, 2);
        assert_eq!(file.suites["unit"].covered_lines, 1);
        assert_eq!(file.suites["api"].covered_lines, 2);
        assert_eq!(file.suites["api"].kind, SuiteKind::Api);

        assert_eq!(report.suites.len(), 2);
        assert_eq!(report.suites[0].name, "unit");
        assert_eq!(report.suites[1].changed_covered_lines, 2);
    }

    #[test]
    fn uncovered_file_gets_a_high_test_gap() {
        let changes: ChangeSet = [modified("gap.rs", &[4, 5])].into_iter().collect();
        let report = run(&changes, &[suite("unit", "SF:other.rs\nDA:1,1\nend_of_record\n")], &[], 80.0);

        assert_eq!(report.insights[0].kind, InsightKind::Warning);
        assert_eq!(report.insights[0].title, "Coverage below threshold");
        let gap = &report.insights[1];
        assert_eq!(gap.category, InsightCategory::TestGap);
        assert_eq!(gap.severity, Severity::High);
        assert_eq!(gap.line_numbers, vec![4, 5]);
        assert_eq!(gap.file.as_deref(), Some("gap.rs"));

        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.recommendations[0].files, vec!["gap.rs"]);
        assert_eq!(report.at_risk_files, 1);
    }

    #[test]
    fn single_kind_coverage_gets_a_medium_test_gap() {
        let changes: ChangeSet = [modified("f.rs", &[1, 2])].into_iter().collect();
        let suites = [
            suite("unit", "SF:f.rs\nDA:1,1\nDA:2,0\nend_of_record\n"),
            suite("api", "SF:other.rs\nDA:1,1\nend_of_record\n"),
        ];
        let report = run(&changes, &suites, &[], 50.0);
        let gap = report
            .insights
            .iter()
            .find(|i| i.category == InsightCategory::TestGap)
            .unwrap();
        assert_eq!(gap.kind, InsightKind::Info);
        assert_eq!(gap.severity, Severity::Medium);
        assert_eq!(gap.title, "Unit tests only, consider integration tests");
    }

    #[test]
    fn two_kinds_covering_means_no_gap_insight() {
        let changes: ChangeSet = [modified("f.rs", &[1, 2, 3])].into_iter().collect();
        let suites = [
            suite("unit", "SF:f.rs\nDA:1,1\nend_of_record\n"),
            suite("api", "SF:f.rs\nDA:2,1\nend_of_record\n"),
        ];
        let report = run(&changes, &suites, &[], 50.0);
        assert!(report
            .insights
            .iter()
            .all(|i| i.category != InsightCategory::TestGap));
    }

    #[test]
    fn fully_covered_change_meets_threshold() {
        let changes: ChangeSet = [modified("ok.rs", &[1])].into_iter().collect();
        let report = run(&changes, &[suite("unit", "SF:ok.rs\nDA:1,1\nend_of_record\n")], &[], 80.0);
        assert!(report.meets_threshold());
        assert!(report.meets_thresholds());
        assert_eq!(report.insights.len(), 1);
        assert_eq!(report.insights[0].title, "Coverage threshold met");
        assert!(report.recommendations.is_empty());
        assert_eq!(report.healthy_files, 1);
    }

    #[test]
    fn per_file_thresholds_follow_classification() {
        let changes: ChangeSet = [
            FileChange::new("new.rs", true).with_added_lines([1, 2]),
            modified("old.rs", &[1, 2]),
        ]
        .into_iter()
        .collect();
        let suites = [suite(
            "unit",
            "SF:new.rs\nDA:1,1\nDA:2,0\nend_of_record\nSF:old.rs\nDA:1,1\nDA:2,0\nend_of_record\n",
        )];
        let thresholds = Thresholds {
            overall: 50.0,
            new_files: 90.0,
            modified_files: 40.0,
        };
        let report = analyze_health(
            Some(&changes),
            &suites,
            &[],
            &thresholds,
            &AnalyzeOptions::default(),
        )
        .unwrap();
        assert!(report.files["new.rs"].needs_attention);
        assert!(!report.files["old.rs"].needs_attention);
        assert!(report.meets_threshold());
        assert!(!report.meets_thresholds());
        assert_eq!(report.recommendations[0].files, vec!["new.rs"]);
    }

    #[test]
    fn project_totals_come_from_merged_coverage() {
        let changes: ChangeSet = [modified("a.rs", &[1])].into_iter().collect();
        let suites = [
            suite("unit", "SF:a.rs\nDA:1,1\nDA:2,0\nend_of_record\n"),
            suite("api", "SF:b.rs\nDA:1,0\nend_of_record\n"),
        ];
        let report = run(&changes, &suites, &[], 80.0);
        assert_eq!(report.total_files, 2);
        assert_eq!(report.total_lines, 3);
        assert_eq!(report.total_covered_lines, 1);
        assert_eq!(report.total_uncovered_lines, 2);
        let file = &report.files["a.rs"];
        assert_eq!(file.total_lines, 2);
        assert_eq!(file.coverage_percentage, 50.0);
    }
}
