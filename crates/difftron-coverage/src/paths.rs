//! Matching diff paths to coverage keys.
//!
//! Coverage tools disagree on how they spell a path: absolute, `./`-prefixed,
//! with backslashes, or relative to a source root. Diffs always use
//! repository-relative forward-slash paths. [`normalize`] brings both to the
//! diff's form, and [`resolve`] / [`lookup`] find the key a diff path refers to.

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use difftron_core::PathMatching;

use crate::model::{CoverageRecord, CoverageReport};

type Discover = Box<dyn Fn() -> Option<PathBuf> + Send + Sync>;

/// The repository root, discovered lazily and at most once.
///
/// The discovery function is injected so that library code never touches
/// the process environment on its own. The binary passes a git-based
/// discovery; tests use [`RepoRoot::fixed`] or [`RepoRoot::none`].
///
/// # Examples
///
/// ```
/// use difftron_coverage::paths::RepoRoot;
///
/// let root = RepoRoot::fixed("/work/repo/");
/// assert_eq!(root.get(), Some("/work/repo"));
/// assert_eq!(RepoRoot::none().get(), None);
/// ```
pub struct RepoRoot {
    cell: OnceLock<Option<String>>,
    discover: Discover,
}

impl RepoRoot {
    /// Wrap a discovery function. It runs on the first [`RepoRoot::get`].
    pub fn new<F>(discover: F) -> Self
    where
        F: Fn() -> Option<PathBuf> + Send + Sync + 'static,
    {
        Self {
            cell: OnceLock::new(),
            discover: Box::new(discover),
        }
    }

    /// A root known up front.
    pub fn fixed(root: impl Into<PathBuf>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Some(clean_root(root.into())));
        Self {
            cell,
            discover: Box::new(|| None),
        }
    }

    /// No repository root; absolute paths only lose their leading `/`.
    pub fn none() -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(None);
        Self {
            cell,
            discover: Box::new(|| None),
        }
    }

    /// The root as a forward-slash string without a trailing `/`.
    pub fn get(&self) -> Option<&str> {
        self.cell
            .get_or_init(|| {
                let root = (self.discover)().map(clean_root);
                tracing::debug!(root = ?root, "discovered repository root");
                root
            })
            .as_deref()
    }
}

impl Default for RepoRoot {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for RepoRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoRoot")
            .field("root", &self.cell.get())
            .finish_non_exhaustive()
    }
}

fn clean_root(root: PathBuf) -> String {
    let root = root.to_string_lossy().replace('\\', "/");
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Bring a coverage or diff path to repository-relative forward-slash form.
///
/// # Examples
///
/// ```
/// use difftron_coverage::paths::{normalize, RepoRoot};
///
/// let root = RepoRoot::fixed("/work/repo");
/// assert_eq!(normalize("./src\\lib.rs", &root), "src/lib.rs");
/// assert_eq!(normalize("/work/repo/src/lib.rs", &root), "src/lib.rs");
/// assert_eq!(normalize("/elsewhere/lib.rs", &root), "elsewhere/lib.rs");
/// ```
pub fn normalize(path: &str, root: &RepoRoot) -> String {
    let slashed = path.replace('\\', "/");
    let path = slashed.strip_prefix("./").unwrap_or(&slashed);

    if is_absolute(path) {
        if let Some(root) = root.get() {
            if path == root {
                return String::new();
            }
            if let Some(rest) = path.strip_prefix(root).and_then(|r| r.strip_prefix('/')) {
                return rest.to_string();
            }
        }
    }
    path.trim_start_matches('/').to_string()
}

/// Absolute after slash conversion: `/x` or a drive path like `C:/x`.
fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || (bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/')
}

fn basename(path: &str) -> &str {
    let path = path.trim_end_matches(['/', '\\']);
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Find the key in `keys` that `target` refers to.
///
/// Strategies, first hit wins: exact key; normalized target equals a key;
/// normalized target equals a normalized key; same basename. `Strict` stops
/// after the second. Keys are scanned in the order given.
///
/// # Examples
///
/// ```
/// use difftron_core::PathMatching;
/// use difftron_coverage::paths::{resolve, RepoRoot};
///
/// let keys = ["/ci/build/src/app.rs", "src/util.rs"];
/// let root = RepoRoot::fixed("/ci/build");
/// assert_eq!(resolve("src/app.rs", keys, &root, PathMatching::Fuzzy), Some("/ci/build/src/app.rs"));
/// assert_eq!(resolve("./src/util.rs", keys, &root, PathMatching::Strict), Some("src/util.rs"));
/// assert_eq!(resolve("src/app.rs", keys, &root, PathMatching::Strict), None);
/// ```
pub fn resolve<'a, I>(
    target: &str,
    keys: I,
    root: &RepoRoot,
    mode: PathMatching,
) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
    I::IntoIter: Clone,
{
    let keys = keys.into_iter();
    if let Some(hit) = keys.clone().find(|k| *k == target) {
        return Some(hit);
    }

    let normalized = normalize(target, root);
    if let Some(hit) = keys.clone().find(|k| *k == normalized) {
        return Some(hit);
    }

    if mode == PathMatching::Strict {
        return None;
    }

    if let Some(hit) = keys.clone().find(|k| normalize(k, root) == normalized) {
        return Some(hit);
    }

    let name = basename(&normalized);
    if name.is_empty() {
        return None;
    }
    let hit = keys.into_iter().find(|k| basename(k) == name);
    if let Some(key) = hit {
        tracing::debug!(path = target, key, "matched coverage key by basename");
    }
    hit
}

/// Find the coverage record for a diff path in `report`.
///
/// `Strict` tries the path as given and then normalized, both as direct map
/// lookups. `Fuzzy` falls back to scanning every key.
pub fn lookup<'r>(
    report: &'r CoverageReport,
    path: &str,
    root: &RepoRoot,
    mode: PathMatching,
) -> Option<(&'r str, &'r CoverageRecord)> {
    if let Some(hit) = report.record_entry(path) {
        return Some(hit);
    }
    let normalized = normalize(path, root);
    if let Some(hit) = report.record_entry(&normalized) {
        return Some(hit);
    }
    if mode == PathMatching::Strict {
        tracing::debug!(path, "no coverage record");
        return None;
    }

    let keys: Vec<&'r str> = report.paths().collect();
    let key = resolve(path, keys.iter().copied(), root, mode);
    match key {
        Some(key) => report.record_entry(key),
        None => {
            tracing::debug!(path, "no coverage record");
            None
        }
    }
}
