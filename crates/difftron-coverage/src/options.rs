use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::paths::RepoRoot;

/// Answers whether a candidate source path exists.
///
/// Cobertura reports name files relative to one of several source roots;
/// the parser asks a probe which root actually holds the file.
pub trait FileProbe: Send + Sync {
    /// Whether `path` names an existing file.
    fn exists(&self, path: &str) -> bool;
}

/// Probe backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl FileProbe for FsProbe {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }
}

impl<F> FileProbe for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn exists(&self, path: &str) -> bool {
        self(path)
    }
}

/// Context shared by the coverage parsers.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use difftron_coverage::paths::RepoRoot;
/// use difftron_coverage::ParseOptions;
///
/// let options = ParseOptions::default()
///     .with_repo_root(Arc::new(RepoRoot::fixed("/src/app")))
///     .with_module_prefixes(vec!["example.com/app/".into()]);
/// assert_eq!(options.repo_root.get(), Some("/src/app"));
/// ```
#[derive(Clone)]
pub struct ParseOptions {
    /// Root used to rebase absolute paths.
    pub repo_root: Arc<RepoRoot>,
    /// Existence check for Cobertura source-root resolution.
    pub probe: Arc<dyn FileProbe>,
    /// Prefixes stripped from Go profile paths, tried in order.
    pub module_prefixes: Vec<String>,
}

impl ParseOptions {
    /// Replace the repository root.
    pub fn with_repo_root(mut self, root: Arc<RepoRoot>) -> Self {
        self.repo_root = root;
        self
    }

    /// Replace the source-file probe.
    pub fn with_probe(mut self, probe: Arc<dyn FileProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replace the Go module prefixes.
    pub fn with_module_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.module_prefixes = prefixes;
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            repo_root: Arc::new(RepoRoot::none()),
            probe: Arc::new(FsProbe),
            module_prefixes: Vec::new(),
        }
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("repo_root", &self.repo_root)
            .field("module_prefixes", &self.module_prefixes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_probe_sees_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("present.py");
        std::fs::write(&file, "x = 1\n").unwrap();
        assert!(FsProbe.exists(&file.to_string_lossy()));
        assert!(!FsProbe.exists(&dir.path().join("absent.py").to_string_lossy()));
    }

    #[test]
    fn closures_are_probes() {
        let probe = |p: &str| p.ends_with(".rs");
        assert!(probe.exists("a.rs"));
        assert!(!FileProbe::exists(&probe, "a.py"));
    }
}
