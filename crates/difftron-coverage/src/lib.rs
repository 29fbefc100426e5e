//! Coverage artifact ingestion.
//!
//! Reads LCOV tracefiles, Cobertura XML, and Go cover profiles into one
//! [`CoverageReport`] model, and matches diff paths to the file keys those
//! tools write.
//!
//! # Examples
//!
//! ```
//! use difftron_coverage::{parse_coverage, ParseOptions};
//!
//! let report = parse_coverage("SF:src/lib.rs\nDA:1,1\nend_of_record\n", None, &ParseOptions::default()).unwrap();
//! assert!(report.is_line_covered("src/lib.rs", 1));
//! ```

pub mod cobertura;
pub mod detect;
pub mod gocov;
pub mod lcov;
pub mod model;
pub mod options;
pub mod paths;

use std::path::Path;

use difftron_core::DifftronError;

pub use detect::{detect_format, CoverageFormat};
pub use model::{CoverageRecord, CoverageReport, CoverageTotals, Precision};
pub use options::{FileProbe, FsProbe, ParseOptions};

/// Detect the dialect of `content` and parse it.
///
/// `path_hint` is the artifact's file name, consulted only when the content
/// does not reveal its dialect.
///
/// # Errors
///
/// Returns [`DifftronError::UnparseableCoverage`] if the detected parser
/// cannot make sense of the content.
pub fn parse_coverage(
    content: &str,
    path_hint: Option<&Path>,
    options: &ParseOptions,
) -> Result<CoverageReport, DifftronError> {
    let format = detect_format(content, path_hint);
    tracing::debug!(%format, hint = ?path_hint, "detected coverage format");
    format.parse(content, options)
}
