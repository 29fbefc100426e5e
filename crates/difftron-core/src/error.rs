use std::path::PathBuf;

/// Errors that can occur across difftron.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to a `miette` diagnostic at the boundary.
///
/// A path that matches no coverage record is deliberately *not* an error: the
/// analyzer reports 0% for that file instead.
///
/// # Examples
///
/// ```
/// use difftron_core::DifftronError;
///
/// let err = DifftronError::InvalidInput("coverage report is required".into());
/// assert!(err.to_string().contains("coverage report is required"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DifftronError {
    /// A required argument was missing or empty.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A hunk header carried a non-numeric line field. Fatal for the whole diff.
    #[error("malformed hunk header on diff line {line}: {header}")]
    MalformedHunkHeader {
        /// 1-based line number within the diff text.
        line: usize,
        /// The offending header text.
        header: String,
    },

    /// A coverage artifact could not be recognized at all.
    #[error("unparseable {format} coverage artifact: {reason}")]
    UnparseableCoverage {
        /// Name of the dialect that was attempted.
        format: String,
        /// Why the content was rejected.
        reason: String,
    },

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A coverage artifact named on the command line does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
