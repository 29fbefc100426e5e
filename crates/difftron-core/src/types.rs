use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Percentage of `covered` over `total`, or `0.0` when `total` is zero.
///
/// The result is clamped to `[0.0, 100.0]`.
///
/// # Examples
///
/// ```
/// use difftron_core::percentage;
///
/// assert_eq!(percentage(1, 2), 50.0);
/// assert_eq!(percentage(0, 0), 0.0);
/// ```
pub fn percentage(covered: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (covered as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Severity of an insight, or priority of a recommendation.
///
/// # Examples
///
/// ```
/// use difftron_core::Severity;
///
/// let s: Severity = serde_json::from_str("\"critical\"").unwrap();
/// assert_eq!(s, Severity::Critical);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; nothing to fix.
    Low,
    /// Worth a look when convenient.
    Medium,
    /// Should be addressed before merging.
    High,
    /// Blocks the gate; a regression against the baseline.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// How aggressively diff paths are matched against coverage keys.
///
/// # Examples
///
/// ```
/// use difftron_core::PathMatching;
///
/// let m: PathMatching = "fuzzy".parse().unwrap();
/// assert_eq!(m, PathMatching::Fuzzy);
/// assert_eq!(PathMatching::default(), PathMatching::Strict);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathMatching {
    /// Exact key, then the normalized path.
    #[default]
    Strict,
    /// Strict, then a normalized scan of every key, then a basename match.
    Fuzzy,
}

impl fmt::Display for PathMatching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathMatching::Strict => write!(f, "strict"),
            PathMatching::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

impl FromStr for PathMatching {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(PathMatching::Strict),
            "fuzzy" => Ok(PathMatching::Fuzzy),
            other => Err(format!("unknown path matching mode: {other}")),
        }
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use difftron_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
