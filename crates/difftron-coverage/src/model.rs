use std::collections::BTreeMap;

use difftron_core::percentage;
use serde::Serialize;

/// How exact the line data in a [`CoverageReport`] is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Precision {
    /// Every instrumented line carries its own hit count.
    #[default]
    Line,
    /// Only function start lines are known, from a function summary.
    FunctionApproximate,
}

/// Hit counts for one source file.
///
/// A line absent from the map is not instrumented. Recording the same line
/// twice keeps the larger count and counts the line once.
///
/// # Examples
///
/// ```
/// use difftron_coverage::CoverageRecord;
///
/// let mut record = CoverageRecord::default();
/// record.record(10, 5);
/// record.record(11, 0);
/// record.record(10, 2);
/// assert_eq!(record.total_lines(), 2);
/// assert_eq!(record.covered_lines(), 1);
/// assert_eq!(record.hits(10), Some(5));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRecord {
    line_hits: BTreeMap<u32, u64>,
    total_lines: usize,
    covered_lines: usize,
}

impl CoverageRecord {
    /// Record `hits` for `line`, keeping the maximum if already present.
    pub fn record(&mut self, line: u32, hits: u64) {
        match self.line_hits.get_mut(&line) {
            Some(existing) => {
                if hits > 0 && *existing == 0 {
                    self.covered_lines += 1;
                }
                *existing = (*existing).max(hits);
            }
            None => {
                self.line_hits.insert(line, hits);
                self.total_lines += 1;
                if hits > 0 {
                    self.covered_lines += 1;
                }
            }
        }
    }

    /// Hit count for `line`, or `None` if the line is not instrumented.
    pub fn hits(&self, line: u32) -> Option<u64> {
        self.line_hits.get(&line).copied()
    }

    /// Whether `line` was executed at least once.
    pub fn is_line_covered(&self, line: u32) -> bool {
        self.hits(line).is_some_and(|h| h > 0)
    }

    /// All instrumented lines with their hit counts, in line order.
    pub fn line_hits(&self) -> &BTreeMap<u32, u64> {
        &self.line_hits
    }

    /// Number of instrumented lines.
    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    /// Number of instrumented lines with a non-zero hit count.
    pub fn covered_lines(&self) -> usize {
        self.covered_lines
    }

    /// Line coverage of this file as a percentage in `0..=100`.
    pub fn percentage(&self) -> f64 {
        percentage(self.covered_lines, self.total_lines)
    }

    /// Override the instrumented-line total.
    ///
    /// Used when merging suites, where the total comes from one input rather
    /// than the union of lines.
    pub fn set_total_lines(&mut self, total: usize) {
        self.total_lines = total;
    }
}

impl FromIterator<(u32, u64)> for CoverageRecord {
    fn from_iter<I: IntoIterator<Item = (u32, u64)>>(iter: I) -> Self {
        let mut record = Self::default();
        for (line, hits) in iter {
            record.record(line, hits);
        }
        record
    }
}

/// Project-wide line totals of a [`CoverageReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageTotals {
    /// Instrumented lines across all files.
    pub total_lines: usize,
    /// Covered lines across all files.
    pub covered_lines: usize,
}

impl CoverageTotals {
    /// Coverage percentage in `0..=100`.
    pub fn percentage(&self) -> f64 {
        percentage(self.covered_lines, self.total_lines)
    }
}

/// Per-file coverage parsed from one artifact.
///
/// Keys are the paths as the artifact (or its parser) wrote them; use
/// [`crate::paths::lookup`] to find the record for a diff path.
///
/// # Examples
///
/// ```
/// use difftron_coverage::CoverageReport;
///
/// let mut report = CoverageReport::default();
/// report.record_line("src/lib.rs", 3, 1);
/// report.record_line("src/lib.rs", 4, 0);
/// assert!(report.is_line_covered("src/lib.rs", 3));
/// assert!(!report.is_line_covered("src/lib.rs", 4));
/// assert!(!report.is_line_covered("src/lib.rs", 99));
/// assert_eq!(report.totals().percentage(), 50.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    files: BTreeMap<String, CoverageRecord>,
    precision: Precision,
}

impl CoverageReport {
    /// Create an empty report with the given precision.
    pub fn with_precision(precision: Precision) -> Self {
        Self {
            files: BTreeMap::new(),
            precision,
        }
    }

    /// Record `hits` for `line` of `path`, creating the file record if needed.
    pub fn record_line(&mut self, path: &str, line: u32, hits: u64) {
        match self.files.get_mut(path) {
            Some(record) => record.record(line, hits),
            None => {
                let mut record = CoverageRecord::default();
                record.record(line, hits);
                self.files.insert(path.to_string(), record);
            }
        }
    }

    /// Insert a whole file record, merging line by line with any existing one.
    pub fn merge_record(&mut self, path: &str, record: &CoverageRecord) {
        let entry = self.files.entry(path.to_string()).or_default();
        for (&line, &hits) in record.line_hits() {
            entry.record(line, hits);
        }
    }

    /// Make sure `path` has a record, even an empty one.
    pub fn touch(&mut self, path: &str) -> &mut CoverageRecord {
        self.files.entry(path.to_string()).or_default()
    }

    /// The record stored under exactly `path`.
    pub fn record(&self, path: &str) -> Option<&CoverageRecord> {
        self.files.get(path)
    }

    /// The stored key and record for exactly `path`.
    pub fn record_entry(&self, path: &str) -> Option<(&str, &CoverageRecord)> {
        self.files.get_key_value(path).map(|(k, v)| (k.as_str(), v))
    }

    /// Hit count for `line` in the record stored under exactly `path`.
    pub fn hits(&self, path: &str, line: u32) -> Option<u64> {
        self.record(path).and_then(|r| r.hits(line))
    }

    /// Whether `line` of `path` was executed. Unknown files and lines are uncovered.
    pub fn is_line_covered(&self, path: &str, line: u32) -> bool {
        self.record(path).is_some_and(|r| r.is_line_covered(line))
    }

    /// All files in key order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &CoverageRecord)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All file keys in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Summed totals across every file.
    pub fn totals(&self) -> CoverageTotals {
        self.files
            .values()
            .fold(CoverageTotals::default(), |mut acc, record| {
                acc.total_lines += record.total_lines();
                acc.covered_lines += record.covered_lines();
                acc
            })
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the report has no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Precision of the line data.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Whether the line data is a function-level approximation.
    pub fn is_approximate(&self) -> bool {
        self.precision == Precision::FunctionApproximate
    }
}
