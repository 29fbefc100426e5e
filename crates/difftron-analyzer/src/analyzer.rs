use std::collections::BTreeMap;
use std::sync::Arc;

use difftron_core::{percentage, DifftronError, PathMatching, Thresholds};
use difftron_coverage::paths::{lookup, RepoRoot};
use difftron_coverage::CoverageReport;
use difftron_difflens::parser::{ChangeSet, FileChange};
use serde::Serialize;

/// How the analyzer finds the coverage record for a changed file.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Root used to rebase absolute coverage paths.
    pub repo_root: Arc<RepoRoot>,
    /// Path matching discipline for coverage lookups.
    pub path_matching: PathMatching,
}

/// Change coverage of a single file.
///
/// # Examples
///
/// ```
/// use difftron_analyzer::FileResult;
///
/// let result = FileResult {
///     path: "src/lib.rs".into(),
///     coverage_key: Some("src/lib.rs".into()),
///     total_changed_lines: 2,
///     covered_lines: 1,
///     uncovered_lines: 1,
///     coverage_percentage: 50.0,
///     covered_line_numbers: vec![6],
///     uncovered_line_numbers: vec![7],
///     is_new_file: false,
///     baseline_coverage_percentage: None,
/// };
/// assert!(result.coverage_percentage <= 100.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    /// Path as it appears in the diff.
    pub path: String,
    /// Coverage key the path resolved to, if any.
    pub coverage_key: Option<String>,
    /// Lines the diff changed in this file.
    pub total_changed_lines: usize,
    /// Changed lines with a non-zero hit count.
    pub covered_lines: usize,
    /// Changed lines without one.
    pub uncovered_lines: usize,
    /// `covered / total * 100`, or 0 when nothing changed.
    pub coverage_percentage: f64,
    /// Covered changed lines, ascending.
    pub covered_line_numbers: Vec<u32>,
    /// Uncovered changed lines, ascending.
    pub uncovered_line_numbers: Vec<u32>,
    /// The diff created this file.
    pub is_new_file: bool,
    /// Coverage of the same changed lines in the baseline report.
    ///
    /// `None` for new files and when the baseline has no record for the file.
    pub baseline_coverage_percentage: Option<f64>,
}

/// Change coverage summed over a subset of files.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTypeMetrics {
    /// Changed lines in the subset.
    pub total_changed_lines: usize,
    /// Covered changed lines in the subset.
    pub covered_lines: usize,
    /// Uncovered changed lines in the subset.
    pub uncovered_lines: usize,
    /// Coverage percentage of the subset.
    pub coverage_percentage: f64,
    /// Number of files in the subset.
    pub file_count: usize,
}

impl FileTypeMetrics {
    /// Fold one file into the subset, updating the percentage.
    pub fn add(&mut self, file: &FileResult) {
        self.total_changed_lines += file.total_changed_lines;
        self.covered_lines += file.covered_lines;
        self.uncovered_lines += file.uncovered_lines;
        self.file_count += 1;
        self.coverage_percentage = percentage(self.covered_lines, self.total_changed_lines);
    }

    /// Whether the subset meets `threshold`. A subset with no changed lines
    /// always does.
    pub fn meets(&self, threshold: f64) -> bool {
        self.total_changed_lines == 0 || self.coverage_percentage >= threshold
    }
}

/// Change coverage of a whole diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Changed lines across all files.
    pub total_changed_lines: usize,
    /// Covered changed lines.
    pub covered_lines: usize,
    /// Uncovered changed lines.
    pub uncovered_lines: usize,
    /// Overall change coverage percentage.
    pub coverage_percentage: f64,
    /// Per-file results keyed by diff path.
    pub files: BTreeMap<String, FileResult>,
    /// Files the diff created.
    pub new_files: FileTypeMetrics,
    /// Files the diff modified.
    pub modified_files: FileTypeMetrics,
    /// Some input only had function-level data.
    pub approximate: bool,
}

impl AnalysisResult {
    /// Whether overall change coverage is at least `threshold`.
    ///
    /// # Examples
    ///
    /// ```
    /// use difftron_analyzer::AnalysisResult;
    ///
    /// let result = AnalysisResult { coverage_percentage: 80.0, ..Default::default() };
    /// assert!(result.meets_threshold(80.0));
    /// assert!(!result.meets_threshold(80.1));
    /// ```
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.coverage_percentage >= threshold
    }

    /// Whether the new-file subset meets `new_files` and the modified subset
    /// meets `modified_files`. Subsets without changed lines pass.
    pub fn meets_thresholds(&self, thresholds: &Thresholds) -> bool {
        self.new_files.meets(thresholds.new_files)
            && self.modified_files.meets(thresholds.modified_files)
    }

    /// Whether any changed line is uncovered.
    pub fn has_uncovered_lines(&self) -> bool {
        self.uncovered_lines > 0
    }

    /// Fold one file result into the totals.
    pub fn add_file(&mut self, file: FileResult) {
        self.total_changed_lines += file.total_changed_lines;
        self.covered_lines += file.covered_lines;
        self.uncovered_lines += file.uncovered_lines;
        self.coverage_percentage = percentage(self.covered_lines, self.total_changed_lines);
        if file.is_new_file {
            self.new_files.add(&file);
        } else {
            self.modified_files.add(&file);
        }
        self.files.insert(file.path.clone(), file);
    }
}

/// Compare the changed lines of `change_set` against `current` coverage.
///
/// # Errors
///
/// Returns [`DifftronError::InvalidInput`] if either the change set or the
/// current report is missing.
///
/// # Examples
///
/// ```
/// use difftron_analyzer::{analyze, AnalyzeOptions};
/// use difftron_coverage::lcov;
/// use difftron_difflens::parser::parse_unified_diff;
///
/// let diff = "--- a/f.rs\n+++ b/f.rs\n@@ -5,3 +5,5 @@\n a\n+b\n+c\n d\n";
/// let changes = parse_unified_diff(diff).unwrap();
/// let coverage = lcov::parse("SF:f.rs\nDA:6,5\nDA:7,0\nDA:8,3\nend_of_record\n").unwrap();
///
/// let result = analyze(Some(&changes), Some(&coverage), None, &AnalyzeOptions::default()).unwrap();
/// assert_eq!(result.total_changed_lines, 2);
/// assert_eq!(result.coverage_percentage, 50.0);
/// assert_eq!(result.files["f.rs"].uncovered_line_numbers, vec![7]);
/// ```
pub fn analyze(
    change_set: Option<&ChangeSet>,
    current: Option<&CoverageReport>,
    baseline: Option<&CoverageReport>,
    options: &AnalyzeOptions,
) -> Result<AnalysisResult, DifftronError> {
    let change_set =
        change_set.ok_or_else(|| DifftronError::InvalidInput("change set is required".into()))?;
    let current = current
        .ok_or_else(|| DifftronError::InvalidInput("current coverage report is required".into()))?;

    let mut result = AnalysisResult {
        approximate: current.is_approximate() || baseline.is_some_and(|b| b.is_approximate()),
        ..Default::default()
    };

    for change in change_set.changed_files() {
        result.add_file(analyze_file(change, current, baseline, options));
    }

    tracing::debug!(
        files = result.files.len(),
        changed = result.total_changed_lines,
        covered = result.covered_lines,
        percentage = result.coverage_percentage,
        "analyzed change coverage"
    );
    Ok(result)
}

/// Change coverage of one file against `current` (and `baseline`, for files
/// that existed before the change).
pub fn analyze_file(
    change: &FileChange,
    current: &CoverageReport,
    baseline: Option<&CoverageReport>,
    options: &AnalyzeOptions,
) -> FileResult {
    let matched = lookup(current, &change.path, &options.repo_root, options.path_matching);

    let mut covered_line_numbers = Vec::new();
    let mut uncovered_line_numbers = Vec::new();
    for &line in &change.changed_lines {
        let covered = matched.is_some_and(|(_, record)| record.is_line_covered(line));
        if covered {
            covered_line_numbers.push(line);
        } else {
            uncovered_line_numbers.push(line);
        }
    }

    let baseline_coverage_percentage = match baseline {
        Some(baseline) if !change.is_new_file => {
            lookup(baseline, &change.path, &options.repo_root, options.path_matching).map(
                |(_, record)| {
                    let covered = change
                        .changed_lines
                        .iter()
                        .filter(|&&line| record.is_line_covered(line))
                        .count();
                    percentage(covered, change.changed_lines.len())
                },
            )
        }
        _ => None,
    };

    let total = change.changed_lines.len();
    let covered = covered_line_numbers.len();
    FileResult {
        path: change.path.clone(),
        coverage_key: matched.map(|(key, _)| key.to_string()),
        total_changed_lines: total,
        covered_lines: covered,
        uncovered_lines: uncovered_line_numbers.len(),
        coverage_percentage: percentage(covered, total),
        covered_line_numbers,
        uncovered_line_numbers,
        is_new_file: change.is_new_file,
        baseline_coverage_percentage,
    }
}
