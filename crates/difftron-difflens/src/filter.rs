//! Excluding changed files from analysis.
//!
//! Generated code, vendored dependencies and similar paths rarely carry
//! tests of their own. Patterns from `[analysis] exclude` drop them from a
//! [`ChangeSet`] before any coverage is looked up.

use difftron_core::AnalysisConfig;

use crate::parser::ChangeSet;

/// Glob-based path filter for changed files.
///
/// # Examples
///
/// ```
/// use difftron_difflens::filter::ChangeFilter;
///
/// let filter = ChangeFilter::new(&["vendor/**", "**/*.pb.go"]);
/// assert!(filter.is_excluded("vendor/github.com/x/y.go"));
/// assert!(filter.is_excluded("api/v1/service.pb.go"));
/// assert!(!filter.is_excluded("cmd/main.go"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    patterns: Vec<glob::Pattern>,
}

impl ChangeFilter {
    /// Build a filter from glob patterns. Invalid patterns are logged and ignored.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut compiled = Vec::new();
        for pat in patterns {
            let pat = pat.as_ref();
            match glob::Pattern::new(pat) {
                Ok(p) => compiled.push(p),
                Err(e) => tracing::warn!(pattern = pat, error = %e, "ignoring invalid exclude pattern"),
            }
        }
        Self { patterns: compiled }
    }

    /// Build a filter from the `[analysis]` config section.
    ///
    /// # Examples
    ///
    /// ```
    /// use difftron_core::AnalysisConfig;
    /// use difftron_difflens::filter::ChangeFilter;
    ///
    /// let config = AnalysisConfig {
    ///     exclude: vec!["docs/**".into()],
    ///     ..Default::default()
    /// };
    /// let filter = ChangeFilter::from_config(&config);
    /// assert!(filter.is_excluded("docs/guide.md"));
    /// ```
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(&config.exclude)
    }

    /// Whether no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The first pattern matching `path`, if any.
    pub fn matching_pattern(&self, path: &str) -> Option<&glob::Pattern> {
        self.patterns.iter().find(|p| p.matches(path))
    }

    /// Check if a changed path should be left out.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.matching_pattern(path).is_some()
    }

    /// Drop excluded files from `changes`, returning the paths removed.
    ///
    /// # Examples
    ///
    /// ```
    /// use difftron_difflens::filter::ChangeFilter;
    /// use difftron_difflens::parser::FileChange;
    ///
    /// let mut changes = [
    ///     FileChange::new("src/lib.rs", false).with_added_lines([1]),
    ///     FileChange::new("vendor/dep.rs", true).with_added_lines([1]),
    /// ]
    /// .into_iter()
    /// .collect();
    /// let filter = ChangeFilter::new(&["vendor/**"]);
    /// let removed = filter.apply(&mut changes);
    /// assert_eq!(removed, vec!["vendor/dep.rs".to_string()]);
    /// assert_eq!(changes.len(), 1);
    /// ```
    pub fn apply(&self, changes: &mut ChangeSet) -> Vec<String> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut removed = Vec::new();
        changes.retain_files(|file| match self.matching_pattern(&file.path) {
            Some(pat) => {
                tracing::debug!(path = %file.path, pattern = %pat, "excluding changed file");
                removed.push(file.path.clone());
                false
            }
            None => true,
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unified_diff;

    fn make_changes(paths: &[&str]) -> ChangeSet {
        let mut diff = String::new();
        for path in paths {
            diff.push_str(&format!(
                "diff --git a/{path} b/{path}\n\
                 --- a/{path}\n\
                 +++ b/{path}\n\
                 @@ -1,1 +1,2 @@\n \
                 line\n\
                 +new\n"
            ));
        }
        parse_unified_diff(&diff).unwrap()
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let mut changes = make_changes(&["a.rs", "b.rs"]);
        let removed = ChangeFilter::default().apply(&mut changes);
        assert!(removed.is_empty());
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn patterns_remove_matching_files() {
        let mut changes = make_changes(&["src/a.go", "gen/api.pb.go", "third_party/x.go"]);
        let filter = ChangeFilter::new(&["**/*.pb.go", "third_party/**"]);
        let removed = filter.apply(&mut changes);
        assert_eq!(removed, vec!["gen/api.pb.go", "third_party/x.go"]);
        assert!(changes.file("src/a.go").is_some());
        assert_eq!(changes.total_changed_lines(), 1);
    }

    #[test]
    fn invalid_pattern_is_ignored() {
        let filter = ChangeFilter::new(&["[unclosed", "docs/*"]);
        assert!(filter.is_excluded("docs/a.md"));
        assert!(!filter.is_excluded("[unclosed"));
    }

    #[test]
    fn matching_pattern_reports_first_match() {
        let filter = ChangeFilter::new(&["*.md", "docs/**"]);
        let pat = filter.matching_pattern("README.md").unwrap();
        assert_eq!(pat.as_str(), "*.md");
    }
}
