//! LCOV tracefile reader.
//!
//! Only `SF:`, `DA:` and `end_of_record` carry information here; the other
//! record types are recognised so that a tracefile with no `SF:` at all can
//! be told apart from something that is not a tracefile.

use difftron_core::DifftronError;

use crate::model::{CoverageRecord, CoverageReport};

const KNOWN_RECORDS: &[&str] = &[
    "TN", "SF", "VER", "FN", "FNA", "FNL", "FNDA", "FNF", "FNH", "DA", "BRDA", "BRF", "BRH",
    "LF", "LH",
];

/// Parse LCOV tracefile text.
///
/// File keys are stored as written in the `SF:` lines.
///
/// # Errors
///
/// Returns [`DifftronError::UnparseableCoverage`] if the text is non-blank
/// but contains no LCOV record at all.
///
/// # Examples
///
/// ```
/// let report = difftron_coverage::lcov::parse("SF:f\nDA:10,5\nDA:11,0\nend_of_record\n").unwrap();
/// let record = report.record("f").unwrap();
/// assert_eq!(record.total_lines(), 2);
/// assert_eq!(record.covered_lines(), 1);
/// assert!(!report.is_line_covered("f", 11));
/// ```
pub fn parse(content: &str) -> Result<CoverageReport, DifftronError> {
    let mut report = CoverageReport::default();
    let mut current: Option<(String, CoverageRecord)> = None;
    let mut saw_record = false;
    let mut saw_content = false;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        saw_content = true;

        if line == "end_of_record" {
            saw_record = true;
            if let Some((path, record)) = current.take() {
                report.merge_record(&path, &record);
            }
            continue;
        }

        let Some((kind, value)) = line.split_once(':') else {
            tracing::trace!(line = idx + 1, "skipping non-record lcov line");
            continue;
        };
        if KNOWN_RECORDS.contains(&kind) {
            saw_record = true;
        }

        match kind {
            "SF" => {
                if let Some((path, record)) = current.take() {
                    report.merge_record(&path, &record);
                }
                current = Some((value.trim().to_string(), CoverageRecord::default()));
            }
            "DA" => {
                let Some((_, record)) = current.as_mut() else {
                    tracing::trace!(line = idx + 1, "DA outside of a file record");
                    continue;
                };
                match parse_data_line(value) {
                    Some((number, hits)) => record.record(number, hits),
                    None => tracing::trace!(line = idx + 1, "skipping malformed DA line"),
                }
            }
            _ => {}
        }
    }

    if let Some((path, record)) = current.take() {
        report.merge_record(&path, &record);
    }

    if saw_content && !saw_record {
        return Err(DifftronError::UnparseableCoverage {
            format: "lcov".into(),
            reason: "no LCOV records found".into(),
        });
    }

    tracing::debug!(files = report.len(), "parsed lcov tracefile");
    Ok(report)
}

/// `<line>,<hits>[,<checksum>]`
fn parse_data_line(value: &str) -> Option<(u32, u64)> {
    let mut fields = value.split(',');
    let line = fields.next()?.trim().parse().ok()?;
    let hits = fields.next()?.trim().parse().ok()?;
    match fields.next() {
        Some(_checksum) if fields.next().is_some() => None,
        _ => Some((line, hits)),
    }
}
