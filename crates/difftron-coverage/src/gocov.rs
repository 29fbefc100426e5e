//! Go coverage reader.
//!
//! Reads cover profiles written by `go test -coverprofile`:
//!
//! ```text
//! mode: set
//! example.com/widget/parse.go:12.34,15.2 3 1
//! ```
//!
//! Each record is `path:startLine.col,endLine.col statements count`. When the
//! text has neither a mode line nor any record, it is read as the
//! `go tool cover -func` listing instead, which only knows whole functions.

use difftron_core::DifftronError;

use crate::model::{CoverageReport, Precision};
use crate::options::ParseOptions;

/// Widest line span a single profile block may cover.
const MAX_BLOCK_SPAN: u32 = 100_000;

/// Parse a Go cover profile, or a `go tool cover -func` listing.
///
/// # Errors
///
/// Returns [`DifftronError::UnparseableCoverage`] if the text is non-blank
/// and neither form yields any data.
///
/// # Examples
///
/// ```
/// use difftron_coverage::{gocov, ParseOptions};
///
/// let options = ParseOptions::default().with_module_prefixes(vec!["example.com/w/".into()]);
/// let report = gocov::parse("mode: count\nexample.com/w/a.go:3.1,4.9 2 5\n", &options).unwrap();
/// assert_eq!(report.hits("a.go", 3), Some(5));
/// assert_eq!(report.hits("a.go", 4), Some(5));
/// ```
pub fn parse(content: &str, options: &ParseOptions) -> Result<CoverageReport, DifftronError> {
    let mut report = CoverageReport::default();
    let mut mode: Option<&str> = None;
    let mut records = 0usize;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(m) = line.strip_prefix("mode:") {
            mode = Some(m.trim());
            continue;
        }
        match parse_block(line) {
            Some(block) => {
                let path = strip_module_prefix(block.path, &options.module_prefixes);
                for number in block.start..=block.end {
                    report.record_line(&path, number, block.count);
                }
                records += 1;
            }
            None => tracing::trace!(line = idx + 1, "skipping malformed cover profile line"),
        }
    }

    if mode.is_some() || records > 0 {
        tracing::debug!(mode = ?mode, records, files = report.len(), "parsed go cover profile");
        return Ok(report);
    }

    let report = parse_func_listing(content, options);
    if !report.is_empty() {
        tracing::warn!(
            files = report.len(),
            "go coverage is function-level only; changed-line results are approximate"
        );
        return Ok(report);
    }

    if content.trim().is_empty() {
        return Ok(CoverageReport::default());
    }

    Err(DifftronError::UnparseableCoverage {
        format: "go".into(),
        reason: "neither a cover profile nor a function listing".into(),
    })
}

struct Block<'a> {
    path: &'a str,
    start: u32,
    end: u32,
    count: u64,
}

fn parse_block(line: &str) -> Option<Block<'_>> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 2 {
        return None;
    }
    let (path, range) = fields[0].rsplit_once(':')?;
    let (start, end) = range.split_once(',')?;
    let start = leading_line(start)?;
    let end = leading_line(end)?;
    if path.is_empty() || end < start || end - start >= MAX_BLOCK_SPAN {
        return None;
    }
    // `statements count`; the count is always the last field.
    let count = fields.last()?.parse().ok()?;
    Some(Block {
        path,
        start,
        end,
        count,
    })
}

/// Line number of a `line.column` position.
fn leading_line(position: &str) -> Option<u32> {
    position.split('.').next()?.parse().ok()
}

fn strip_module_prefix(path: &str, prefixes: &[String]) -> String {
    let path = path.replace('\\', "/");
    for prefix in prefixes {
        let prefix = prefix.replace('\\', "/");
        if let Some(rest) = path.strip_prefix(prefix.as_str()) {
            return rest.to_string();
        }
    }
    path
}

/// Read `path:line:<ws>Func<ws>NN.N%` lines. A function's start line gets one
/// hit when any of it ran, zero otherwise.
fn parse_func_listing(content: &str, options: &ParseOptions) -> CoverageReport {
    let mut report = CoverageReport::with_precision(Precision::FunctionApproximate);
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("total:") {
            continue;
        }
        match parse_func_line(line) {
            Some((path, number, percent)) => {
                let path = strip_module_prefix(path, &options.module_prefixes);
                let hits = u64::from(percent > 0.0);
                report.record_line(&path, number, hits);
            }
            None => tracing::trace!(line = idx + 1, "skipping malformed function listing line"),
        }
    }
    report
}

fn parse_func_line(line: &str) -> Option<(&str, u32, f64)> {
    let (path, rest) = line.split_once(':')?;
    let (number, rest) = rest.split_once(':')?;
    let number = number.trim().parse().ok()?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 2 || path.is_empty() {
        return None;
    }
    let percent = fields.last()?.strip_suffix('%')?.parse().ok()?;
    Some((path, number, percent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(prefixes: &[&str]) -> ParseOptions {
        ParseOptions::default()
            .with_module_prefixes(prefixes.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn range_marks_every_line() {
        let report = parse("mode: set\npkg/a.go:10.2,12.3 2 1\npkg/a.go:20.1,20.9 1 0\n", &options(&[]))
            .unwrap();
        let record = report.record("pkg/a.go").unwrap();
        assert_eq!(record.total_lines(), 4);
        assert_eq!(record.covered_lines(), 3);
        assert!(!record.is_line_covered(20));
        assert_eq!(report.precision(), Precision::Line);
    }

    #[test]
    fn overlapping_ranges_keep_max_and_count_once() {
        let profile = "\
mode: count
m/x.go:1.1,3.1 2 0
m/x.go:3.1,4.1 1 7
";
        let report = parse(profile, &options(&[])).unwrap();
        let record = report.record("m/x.go").unwrap();
        assert_eq!(record.total_lines(), 4);
        assert_eq!(record.hits(3), Some(7));
        assert_eq!(record.covered_lines(), 2);
    }

    #[test]
    fn module_prefix_is_stripped() {
        let report = parse(
            "mode: set\ngithub.com/acme/widget/internal/p.go:1.1,1.5 1 1\n",
            &options(&["github.com/other/", "github.com/acme/widget/"]),
        )
        .unwrap();
        assert!(report.is_line_covered("internal/p.go", 1));
    }

    #[test]
    fn malformed_records_are_skipped() {
        let profile = "\
mode: set
bad line
a.go:x.1,2.1 1 1
a.go:5.1,4.1 1 1
a.go:7.1,7.4 1 nope
a.go:8.1,8.9 1 1
";
        let report = parse(profile, &options(&[])).unwrap();
        let record = report.record("a.go").unwrap();
        assert_eq!(record.total_lines(), 1);
        assert!(record.is_line_covered(8));
    }

    #[test]
    fn oversized_blocks_are_skipped() {
        let profile = "\
mode: set
a.go:1.1,4294967295.1 1 1
a.go:4294967290.1,4294967295.1 1 1
a.go:2.1,3.1 1 1
";
        let report = parse(profile, &options(&[])).unwrap();
        let record = report.record("a.go").unwrap();
        assert_eq!(record.total_lines(), 8);
        assert!(record.is_line_covered(4_294_967_295));
        assert!(!record.is_line_covered(1));
    }

    #[test]
    fn mode_line_alone_is_an_empty_profile() {
        let report = parse("mode: atomic\n", &options(&[])).unwrap();
        assert!(report.is_empty());
        assert!(!report.is_approximate());
    }

    #[test]
    fn function_listing_is_approximate() {
        let listing = "\
example.com/w/hunk/parser.go:42:\tParseGitDiff\t100.0%
example.com/w/hunk/parser.go:90:\tparseHeader\t0.0%
example.com/w/cmd/main.go:12:\t\tmain\t\t55.5%
total:\t\t\t\t(statements)\t71.3%
";
        let report = parse(listing, &options(&["example.com/w/"])).unwrap();
        assert!(report.is_approximate());
        assert!(report.is_line_covered("hunk/parser.go", 42));
        assert_eq!(report.hits("hunk/parser.go", 90), Some(0));
        assert!(report.is_line_covered("cmd/main.go", 12));
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn blank_input_is_empty() {
        assert!(parse("\n\n", &options(&[])).unwrap().is_empty());
    }

    #[test]
    fn unrecognisable_text_is_unparseable() {
        let err = parse("<coverage/>\n", &options(&[])).unwrap_err();
        assert!(matches!(err, DifftronError::UnparseableCoverage { .. }));
    }
}
