use std::fmt;
use std::path::Path;
use std::str::FromStr;

use difftron_core::DifftronError;
use serde::{Deserialize, Serialize};

use crate::model::CoverageReport;
use crate::options::ParseOptions;
use crate::{cobertura, gocov, lcov};

/// How many bytes of an artifact the detector looks at.
const SNIFF_LEN: usize = 1024;

/// A coverage artifact dialect.
///
/// # Examples
///
/// ```
/// use difftron_coverage::CoverageFormat;
///
/// let format: CoverageFormat = "cobertura".parse().unwrap();
/// assert_eq!(format, CoverageFormat::Cobertura);
/// assert_eq!(CoverageFormat::GoCover.to_string(), "go");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageFormat {
    /// Line-record tracefile (`SF:` / `DA:` / `end_of_record`).
    #[default]
    Lcov,
    /// Cobertura XML.
    Cobertura,
    /// Go cover profile, or `go tool cover -func` output.
    #[serde(rename = "go")]
    GoCover,
}

impl CoverageFormat {
    /// Parse `content` as this dialect.
    ///
    /// # Errors
    ///
    /// Returns [`DifftronError::UnparseableCoverage`] when the content is not
    /// recognisable as this dialect.
    pub fn parse(
        self,
        content: &str,
        options: &ParseOptions,
    ) -> Result<CoverageReport, DifftronError> {
        match self {
            CoverageFormat::Lcov => lcov::parse(content),
            CoverageFormat::Cobertura => cobertura::parse(content, options),
            CoverageFormat::GoCover => gocov::parse(content, options),
        }
    }
}

impl fmt::Display for CoverageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverageFormat::Lcov => write!(f, "lcov"),
            CoverageFormat::Cobertura => write!(f, "cobertura"),
            CoverageFormat::GoCover => write!(f, "go"),
        }
    }
}

impl FromStr for CoverageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lcov" => Ok(CoverageFormat::Lcov),
            "cobertura" => Ok(CoverageFormat::Cobertura),
            "go" | "gocover" => Ok(CoverageFormat::GoCover),
            other => Err(format!("unknown coverage format: {other}")),
        }
    }
}

/// Guess the dialect of `content`, using `path_hint` only when the content
/// itself is inconclusive.
///
/// # Examples
///
/// ```
/// use difftron_coverage::{detect_format, CoverageFormat};
///
/// assert_eq!(detect_format("mode: set\n", None), CoverageFormat::GoCover);
/// assert_eq!(detect_format("TN:\nSF:a.c\n", None), CoverageFormat::Lcov);
/// assert_eq!(detect_format("", None), CoverageFormat::Lcov);
/// ```
pub fn detect_format(content: &str, path_hint: Option<&Path>) -> CoverageFormat {
    let prefix = sniff_prefix(content);
    let trimmed = prefix.trim_start();

    if trimmed.starts_with("TN:")
        || trimmed.starts_with("SF:")
        || (prefix.contains("SF:") && prefix.contains("DA:"))
    {
        return CoverageFormat::Lcov;
    }

    if (prefix.contains("<coverage") || trimmed.starts_with("<?xml"))
        && (prefix.contains("<package") || prefix.contains("<class"))
    {
        return CoverageFormat::Cobertura;
    }

    if trimmed.starts_with("mode:") {
        return CoverageFormat::GoCover;
    }

    let ext = path_hint
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match ext.as_deref() {
        Some("xml") => CoverageFormat::Cobertura,
        Some("out") => CoverageFormat::GoCover,
        _ => CoverageFormat::Lcov,
    }
}

/// The first [`SNIFF_LEN`] bytes of `content`, cut back to a char boundary.
fn sniff_prefix(content: &str) -> &str {
    if content.len() <= SNIFF_LEN {
        return content;
    }
    let mut end = SNIFF_LEN;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn lcov_wins_on_record_markers() {
        assert_eq!(detect_format("SF:src/a.rs\nDA:1,1\n", None), CoverageFormat::Lcov);
        assert_eq!(
            detect_format("# header\nSF:a\nDA:1,0\n", None),
            CoverageFormat::Lcov
        );
    }

    #[test]
    fn cobertura_needs_structure() {
        let xml = r#"<?xml version="1.0" ?>
<coverage line-rate="0.5">
  <packages><package name="p"><classes><class filename="a.py"/></classes></package></packages>
</coverage>"#;
        assert_eq!(detect_format(xml, None), CoverageFormat::Cobertura);
        assert_eq!(
            detect_format("<?xml version=\"1.0\"?><report/>", None),
            CoverageFormat::Lcov
        );
    }

    #[test]
    fn go_profile_is_detected_from_mode_line() {
        let profile = "mode: count\nexample.com/m/a.go:1.1,2.2 1 1\n";
        assert_eq!(detect_format(profile, None), CoverageFormat::GoCover);
    }

    #[test]
    fn extension_hint_breaks_ties() {
        let opaque = "nothing recognisable";
        let out = PathBuf::from("coverage.out");
        let xml = PathBuf::from("reports/cov.XML");
        let info = PathBuf::from("lcov.info");
        assert_eq!(detect_format(opaque, Some(&out)), CoverageFormat::GoCover);
        assert_eq!(detect_format(opaque, Some(&xml)), CoverageFormat::Cobertura);
        assert_eq!(detect_format(opaque, Some(&info)), CoverageFormat::Lcov);
        assert_eq!(detect_format(opaque, None), CoverageFormat::Lcov);
    }

    #[test]
    fn content_beats_extension() {
        let out = PathBuf::from("coverage.out");
        assert_eq!(detect_format("SF:a\n", Some(&out)), CoverageFormat::Lcov);
    }

    #[test]
    fn markers_past_the_prefix_are_ignored() {
        let mut content = "x".repeat(SNIFF_LEN);
        content.push_str("\nmode: set\n");
        assert_eq!(detect_format(&content, None), CoverageFormat::Lcov);
    }

    #[test]
    fn prefix_respects_char_boundaries() {
        let mut content = "a".repeat(SNIFF_LEN - 1);
        content.push('é');
        content.push_str("tail");
        let prefix = sniff_prefix(&content);
        assert_eq!(prefix.len(), SNIFF_LEN - 1);
    }

    #[test]
    fn format_names_parse() {
        assert_eq!("LCOV".parse::<CoverageFormat>().unwrap(), CoverageFormat::Lcov);
        assert_eq!("go".parse::<CoverageFormat>().unwrap(), CoverageFormat::GoCover);
        assert!("jacoco".parse::<CoverageFormat>().is_err());
    }

    #[test]
    fn format_serializes_lowercase() {
        let json = serde_json::to_string(&CoverageFormat::GoCover).unwrap();
        assert_eq!(json, "\"go\"");
    }
}
