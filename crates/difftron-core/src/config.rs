use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DifftronError;
use crate::types::PathMatching;

/// Top-level configuration loaded from `.difftron.toml`.
///
/// Supports layered resolution: CLI flags > local config > defaults.
///
/// # Examples
///
/// ```
/// use difftron_core::DifftronConfig;
///
/// let config = DifftronConfig::default();
/// assert_eq!(config.thresholds.overall, 80.0);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifftronConfig {
    /// Coverage gate thresholds.
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    /// Change analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Coverage ingestion settings.
    #[serde(default)]
    pub coverage: CoverageConfig,
}

impl DifftronConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DifftronError::Io`] if the file cannot be read,
    /// [`DifftronError::Toml`] if the content is not valid TOML, or
    /// [`DifftronError::Config`] if a value is out of range.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use difftron_core::DifftronConfig;
    /// use std::path::Path;
    ///
    /// let config = DifftronConfig::from_file(Path::new(".difftron.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, DifftronError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`DifftronError::Toml`] if parsing fails, or
    /// [`DifftronError::Config`] if validation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use difftron_core::DifftronConfig;
    ///
    /// let toml = r#"
    /// [thresholds]
    /// overall = 90.0
    /// "#;
    /// let config = DifftronConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.thresholds.overall, 90.0);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, DifftronError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every threshold lies within `0..=100`.
    ///
    /// # Errors
    ///
    /// Returns [`DifftronError::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<(), DifftronError> {
        let t = &self.thresholds;
        let checks = [
            ("thresholds.overall", Some(t.overall)),
            ("thresholds.new_files", t.new_files),
            ("thresholds.modified_files", t.modified_files),
        ];
        for (key, value) in checks {
            if let Some(v) = value {
                if !(0.0..=100.0).contains(&v) {
                    return Err(DifftronError::Config(format!(
                        "{key} must be between 0 and 100, got {v}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Threshold configuration as written in `.difftron.toml`.
///
/// `new_files` and `modified_files` fall back to `overall` when omitted.
///
/// # Examples
///
/// ```
/// use difftron_core::ThresholdConfig;
///
/// let config = ThresholdConfig {
///     overall: 75.0,
///     new_files: Some(90.0),
///     modified_files: None,
/// };
/// let t = config.resolve();
/// assert_eq!(t.new_files, 90.0);
/// assert_eq!(t.modified_files, 75.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Minimum change coverage for the whole diff (default: 80.0).
    #[serde(default = "default_threshold")]
    pub overall: f64,
    /// Minimum change coverage for files new in this diff.
    pub new_files: Option<f64>,
    /// Minimum change coverage for files that existed before this diff.
    pub modified_files: Option<f64>,
}

fn default_threshold() -> f64 {
    80.0
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            overall: default_threshold(),
            new_files: None,
            modified_files: None,
        }
    }
}

impl ThresholdConfig {
    /// Fill in the per-category thresholds from `overall`.
    pub fn resolve(&self) -> Thresholds {
        Thresholds {
            overall: self.overall,
            new_files: self.new_files.unwrap_or(self.overall),
            modified_files: self.modified_files.unwrap_or(self.overall),
        }
    }
}

/// Fully resolved coverage thresholds, each a percentage in `0..=100`.
///
/// # Examples
///
/// ```
/// use difftron_core::Thresholds;
///
/// let t = Thresholds::uniform(80.0);
/// assert_eq!(t.new_files, 80.0);
/// assert_eq!(t.modified_files, 80.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    /// Applies to the diff as a whole.
    pub overall: f64,
    /// Applies to files the diff creates.
    pub new_files: f64,
    /// Applies to files the diff modifies.
    pub modified_files: f64,
}

impl Thresholds {
    /// Use the same threshold for every category.
    pub fn uniform(threshold: f64) -> Self {
        Self {
            overall: threshold,
            new_files: threshold,
            modified_files: threshold,
        }
    }

    /// The threshold that applies to a single file.
    pub fn for_file(&self, is_new_file: bool) -> f64 {
        if is_new_file {
            self.new_files
        } else {
            self.modified_files
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        ThresholdConfig::default().resolve()
    }
}

/// Change analysis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// How diff paths are matched to coverage keys (default: strict).
    #[serde(default)]
    pub path_matching: PathMatching,
    /// Glob patterns for changed files to leave out of the analysis.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Coverage ingestion configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageConfig {
    /// Module path prefixes stripped from Go coverage profile paths,
    /// e.g. `"github.com/acme/widget/"`.
    #[serde(default)]
    pub module_prefixes: Vec<String>,
}
