use difftron_coverage::{CoverageReport, Precision};

use crate::suite::SuiteReport;

/// Merge suites into one report of what any of them exercised.
///
/// For every line, the merged hit count is the maximum across suites, so the
/// result does not depend on suite order. A file's instrumented-line total is
/// taken from the last suite that reports the file, raised to the number of
/// lines any suite instrumented so covered never exceeds total; covered lines
/// are recounted from the merged hits.
///
/// # Examples
///
/// ```
/// use difftron_coverage::lcov;
/// use difftron_health::{aggregate, SuiteReport};
///
/// let unit = lcov::parse("SF:a.rs\nDA:1,1\nDA:2,0\nend_of_record\n").unwrap();
/// let api = lcov::parse("SF:a.rs\nDA:2,4\nend_of_record\n").unwrap();
/// let merged = aggregate(&[
///     SuiteReport::new("unit", unit, "unit.info"),
///     SuiteReport::new("api", api, "api.info"),
/// ]);
/// let record = merged.record("a.rs").unwrap();
/// assert_eq!(record.covered_lines(), 2);
/// assert_eq!(record.hits(2), Some(4));
/// ```
pub fn aggregate(suites: &[SuiteReport]) -> CoverageReport {
    let approximate = suites.iter().any(|s| s.report.is_approximate());
    let mut merged = CoverageReport::with_precision(if approximate {
        Precision::FunctionApproximate
    } else {
        Precision::Line
    });

    for suite in suites {
        for (path, record) in suite.report.files() {
            merged.merge_record(path, record);
            let entry = merged.touch(path);
            let total = record.total_lines().max(entry.line_hits().len());
            entry.set_total_lines(total);
        }
    }

    tracing::debug!(
        suites = suites.len(),
        files = merged.len(),
        "aggregated suite coverage"
    );
    merged
}
