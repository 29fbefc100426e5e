use std::fmt;
use std::str::FromStr;

use difftron_coverage::CoverageReport;
use serde::{Deserialize, Serialize};

/// Category of a test suite.
///
/// # Examples
///
/// ```
/// use difftron_health::SuiteKind;
///
/// let kind: SuiteKind = "e2e".parse().unwrap();
/// assert_eq!(kind, SuiteKind::E2e);
/// assert_eq!(SuiteKind::Api.to_string(), "api");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteKind {
    /// Fast, isolated tests of single units.
    #[default]
    Unit,
    /// Tests against a service's API surface.
    Api,
    /// Black-box feature tests.
    Functional,
    /// Tests across component boundaries.
    Integration,
    /// Full-stack tests driving a real deployment.
    E2e,
}

impl fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuiteKind::Unit => write!(f, "unit"),
            SuiteKind::Api => write!(f, "api"),
            SuiteKind::Functional => write!(f, "functional"),
            SuiteKind::Integration => write!(f, "integration"),
            SuiteKind::E2e => write!(f, "e2e"),
        }
    }
}

impl FromStr for SuiteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unit" => Ok(SuiteKind::Unit),
            "api" => Ok(SuiteKind::Api),
            "functional" => Ok(SuiteKind::Functional),
            "integration" => Ok(SuiteKind::Integration),
            "e2e" | "end-to-end" => Ok(SuiteKind::E2e),
            other => Err(format!("unknown suite kind: {other}")),
        }
    }
}

/// Guess a suite's kind from the artifact path or the command that produced it.
///
/// Falls back to [`SuiteKind::Unit`].
///
/// # Examples
///
/// ```
/// use difftron_health::{detect_suite_kind, SuiteKind};
///
/// assert_eq!(detect_suite_kind("coverage/unit/lcov.info"), SuiteKind::Unit);
/// assert_eq!(detect_suite_kind("reports/integration.xml"), SuiteKind::Integration);
/// assert_eq!(detect_suite_kind("npx playwright test"), SuiteKind::Functional);
/// assert_eq!(detect_suite_kind("coverage.dat"), SuiteKind::Unit);
/// ```
pub fn detect_suite_kind(source: &str) -> SuiteKind {
    let source = source.to_lowercase();
    let has = |needle: &str| source.contains(needle);

    if has("unit") || has("_test.") {
        return SuiteKind::Unit;
    }
    if has("integration") {
        return SuiteKind::Integration;
    }
    if has("api") {
        return SuiteKind::Api;
    }
    if has("e2e") || has("end-to-end") {
        return SuiteKind::E2e;
    }
    if has("functional") {
        return SuiteKind::Functional;
    }
    if has("go test") || has("pytest") || has("jest") {
        return SuiteKind::Unit;
    }
    if has("cypress") || has("playwright") {
        return SuiteKind::Functional;
    }
    if has("postman") || has("newman") {
        return SuiteKind::Api;
    }
    SuiteKind::Unit
}

/// One suite's coverage artifact, parsed.
#[derive(Debug, Clone)]
pub struct SuiteReport {
    /// Display name, e.g. `unit` or `checkout-api`.
    pub name: String,
    /// Category used for test-gap insights.
    pub kind: SuiteKind,
    /// Parsed coverage.
    pub report: CoverageReport,
    /// Artifact path or command the coverage came from.
    pub source: String,
}

impl SuiteReport {
    /// Build a suite, detecting its kind from `name` and then `source`.
    ///
    /// # Examples
    ///
    /// ```
    /// use difftron_coverage::CoverageReport;
    /// use difftron_health::{SuiteKind, SuiteReport};
    ///
    /// let suite = SuiteReport::new("checkout", CoverageReport::default(), "out/cypress/lcov.info");
    /// assert_eq!(suite.kind, SuiteKind::Functional);
    /// ```
    pub fn new(name: impl Into<String>, report: CoverageReport, source: impl Into<String>) -> Self {
        let name = name.into();
        let source = source.into();
        let kind = name
            .parse()
            .unwrap_or_else(|_| detect_suite_kind(&format!("{name} {source}")));
        Self {
            name,
            kind,
            report,
            source,
        }
    }

    /// Override the detected kind.
    pub fn with_kind(mut self, kind: SuiteKind) -> Self {
        self.kind = kind;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_markers_win_first() {
        assert_eq!(detect_suite_kind("pkg/parser_test.go"), SuiteKind::Unit);
        assert_eq!(detect_suite_kind("UNIT-api.info"), SuiteKind::Unit);
    }

    #[test]
    fn api_markers_map_to_api() {
        assert_eq!(detect_suite_kind("cov/api.lcov"), SuiteKind::Api);
        assert_eq!(detect_suite_kind("newman run collection.json"), SuiteKind::Api);
    }

    #[test]
    fn browser_runners_are_functional() {
        assert_eq!(detect_suite_kind("functional/lcov.info"), SuiteKind::Functional);
        assert_eq!(detect_suite_kind("cypress run"), SuiteKind::Functional);
    }

    #[test]
    fn detection_agrees_with_kind_names() {
        for kind in [
            SuiteKind::Unit,
            SuiteKind::Api,
            SuiteKind::Functional,
            SuiteKind::Integration,
            SuiteKind::E2e,
        ] {
            let name = kind.to_string();
            assert_eq!(detect_suite_kind(&format!("reports/{name}.xml")), kind);
            let suite = SuiteReport::new(format!("{name}-suite"), CoverageReport::default(), "x.info");
            assert_eq!(suite.kind, kind);
        }
        assert_eq!(detect_suite_kind("End-To-End.xml"), SuiteKind::E2e);
        assert_eq!(detect_suite_kind("api-integration"), SuiteKind::Integration);
    }

    #[test]
    fn test_runners_are_unit() {
        assert_eq!(detect_suite_kind("pytest --cov"), SuiteKind::Unit);
        assert_eq!(detect_suite_kind("go test ./..."), SuiteKind::Unit);
    }

    #[test]
    fn explicit_kind_name_is_used() {
        let suite = SuiteReport::new("integration", CoverageReport::default(), "x.info");
        assert_eq!(suite.kind, SuiteKind::Integration);
        let suite = SuiteReport::new("smoke", CoverageReport::default(), "x.info");
        assert_eq!(suite.kind, SuiteKind::Unit);
    }

    #[test]
    fn with_kind_overrides() {
        let suite = SuiteReport::new("a", CoverageReport::default(), "b").with_kind(SuiteKind::E2e);
        assert_eq!(suite.kind, SuiteKind::E2e);
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("API".parse::<SuiteKind>().unwrap(), SuiteKind::Api);
        assert!("smoke".parse::<SuiteKind>().is_err());
    }
}
