use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use difftron_core::DifftronError;
use serde::Serialize;

const DEV_NULL: &str = "/dev/null";

/// Lines a diff touched in a single file.
///
/// `changed_lines` and `added_lines` use post-change line numbers;
/// `removed_lines` uses pre-change line numbers. Exactly one of
/// `is_new_file` / `is_modified_file` is set.
///
/// # Examples
///
/// ```
/// use difftron_difflens::parser::FileChange;
///
/// let change = FileChange::new("src/lib.rs", false).with_added_lines([3, 4]);
/// assert!(change.is_modified_file);
/// assert_eq!(change.changed_lines.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Path in the post-change tree, without the `b/` prefix.
    pub path: String,
    /// Post-change line numbers the diff changed.
    pub changed_lines: BTreeSet<u32>,
    /// Post-change line numbers the diff added.
    pub added_lines: BTreeSet<u32>,
    /// Pre-change line numbers the diff removed.
    pub removed_lines: BTreeSet<u32>,
    /// The file did not exist before the change.
    pub is_new_file: bool,
    /// The file existed before the change.
    pub is_modified_file: bool,
}

impl FileChange {
    /// Create an empty change record for `path`.
    pub fn new(path: impl Into<String>, is_new_file: bool) -> Self {
        Self {
            path: path.into(),
            changed_lines: BTreeSet::new(),
            added_lines: BTreeSet::new(),
            removed_lines: BTreeSet::new(),
            is_new_file,
            is_modified_file: !is_new_file,
        }
    }

    /// Record `lines` as added (and therefore changed).
    pub fn with_added_lines(mut self, lines: impl IntoIterator<Item = u32>) -> Self {
        for line in lines {
            self.record_added(line);
        }
        self
    }

    fn record_added(&mut self, line: u32) {
        self.changed_lines.insert(line);
        self.added_lines.insert(line);
    }
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_new_file { "new" } else { "modified" };
        write!(
            f,
            "{} ({kind}, +{} -{})",
            self.path,
            self.added_lines.len(),
            self.removed_lines.len()
        )
    }
}

/// Every file a diff touched, keyed by post-change path.
///
/// Built once by [`parse_unified_diff`] (or collected from [`FileChange`]s)
/// and read-only afterwards, apart from [`ChangeSet::retain_files`].
///
/// # Examples
///
/// ```
/// use difftron_difflens::parser::parse_unified_diff;
///
/// let diff = "\
/// --- /dev/null
/// +++ b/src/new.rs
/// @@ -0,0 +1,2 @@
/// +fn a() {}
/// +fn b() {}
/// ";
/// let changes = parse_unified_diff(diff).unwrap();
/// assert!(changes.is_new_file("src/new.rs"));
/// assert_eq!(changes.total_changed_lines(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    files: BTreeMap<String, FileChange>,
}

impl ChangeSet {
    /// All files in path order, including those with no changed lines.
    pub fn files(&self) -> impl Iterator<Item = &FileChange> {
        self.files.values()
    }

    /// Files with at least one changed line, in path order.
    ///
    /// A file whose hunks only removed lines contributes nothing to
    /// change coverage and is left out here.
    pub fn changed_files(&self) -> impl Iterator<Item = &FileChange> {
        self.files.values().filter(|f| !f.changed_lines.is_empty())
    }

    /// The change record for `path`, if the diff touched it.
    pub fn file(&self, path: &str) -> Option<&FileChange> {
        self.files.get(path)
    }

    /// Changed line numbers for `path`.
    pub fn changed_lines(&self, path: &str) -> Option<&BTreeSet<u32>> {
        self.files.get(path).map(|f| &f.changed_lines)
    }

    /// Added line numbers for `path`.
    pub fn added_lines(&self, path: &str) -> Option<&BTreeSet<u32>> {
        self.files.get(path).map(|f| &f.added_lines)
    }

    /// Removed (pre-change) line numbers for `path`.
    pub fn removed_lines(&self, path: &str) -> Option<&BTreeSet<u32>> {
        self.files.get(path).map(|f| &f.removed_lines)
    }

    /// Whether `path` was created by the diff.
    pub fn is_new_file(&self, path: &str) -> bool {
        self.files.get(path).is_some_and(|f| f.is_new_file)
    }

    /// Whether `path` existed before the diff.
    pub fn is_modified_file(&self, path: &str) -> bool {
        self.files.get(path).is_some_and(|f| f.is_modified_file)
    }

    /// Whether any file has at least one changed line.
    pub fn has_changes(&self) -> bool {
        self.changed_files().next().is_some()
    }

    /// Number of changed lines across all files.
    pub fn total_changed_lines(&self) -> usize {
        self.files.values().map(|f| f.changed_lines.len()).sum()
    }

    /// Number of files in the set.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the diff touched no files at all.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Keep only the files for which `keep` returns `true`.
    pub fn retain_files<F>(&mut self, mut keep: F)
    where
        F: FnMut(&FileChange) -> bool,
    {
        self.files.retain(|_, f| keep(f));
    }
}

impl FromIterator<FileChange> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = FileChange>>(iter: I) -> Self {
        let files = iter.into_iter().map(|f| (f.path.clone(), f)).collect();
        Self { files }
    }
}

#[derive(Debug, Clone, Copy)]
struct HunkRange {
    old_start: u32,
    old_count: u32,
    new_start: u32,
    new_count: u32,
}

/// Parse a unified diff string (as produced by `git diff`) into a [`ChangeSet`].
///
/// Lines that fit no diff construct are skipped. Files deleted by the diff
/// (`+++ /dev/null`) get no entry.
///
/// # Errors
///
/// Returns [`DifftronError::MalformedHunkHeader`] if a hunk header has a
/// non-numeric line field. Nothing parsed so far is returned in that case.
///
/// # Examples
///
/// ```
/// use difftron_difflens::parser::parse_unified_diff;
///
/// let changes = parse_unified_diff("").unwrap();
/// assert!(changes.is_empty());
/// ```
pub fn parse_unified_diff(input: &str) -> Result<ChangeSet, DifftronError> {
    let mut files: BTreeMap<String, FileChange> = BTreeMap::new();
    let mut pre_image: Option<String> = None;
    let mut current: Option<String> = None;
    let mut in_hunk = false;
    let mut new_cursor: u32 = 0;
    let mut old_cursor: u32 = 0;

    let mut lines = input.lines().enumerate().peekable();
    while let Some((idx, line)) = lines.next() {
        if line.starts_with("diff --git ") {
            current = None;
            pre_image = None;
            in_hunk = false;
            continue;
        }

        // A `--- ` line is a pre-image marker only when the post-image marker
        // follows; inside a hunk it is a removed line starting with "--".
        if let Some(raw) = line.strip_prefix("--- ") {
            let next_is_post_image = lines
                .peek()
                .is_some_and(|(_, next)| next.starts_with("+++ "));
            if next_is_post_image || !in_hunk {
                pre_image = Some(parse_path(raw));
                in_hunk = false;
                continue;
            }
        }

        if let Some(raw) = line.strip_prefix("+++ ") {
            if pre_image.is_some() || !in_hunk {
                in_hunk = false;
                let path = parse_path(raw);
                let before = pre_image.take();
                if path == DEV_NULL {
                    current = None;
                    continue;
                }
                let is_new_file = before.as_deref().map_or(true, |p| p == DEV_NULL);
                files
                    .entry(path.clone())
                    .or_insert_with(|| FileChange::new(path.clone(), is_new_file));
                current = Some(path);
                continue;
            }
        }

        if line.starts_with("@@") {
            match parse_hunk_header(line, idx + 1)? {
                Some(range) => {
                    tracing::trace!(
                        old_start = range.old_start,
                        old_count = range.old_count,
                        new_start = range.new_start,
                        new_count = range.new_count,
                        "hunk"
                    );
                    new_cursor = range.new_start.saturating_sub(1);
                    old_cursor = range.old_start.saturating_sub(1);
                    in_hunk = true;
                }
                None => {
                    tracing::trace!(line = idx + 1, "skipping unrecognized hunk header");
                    in_hunk = false;
                }
            }
            continue;
        }

        let Some(file) = current.as_ref().and_then(|p| files.get_mut(p)) else {
            continue;
        };
        if !in_hunk || line.starts_with('\\') {
            continue;
        }

        if line.starts_with('+') {
            new_cursor = new_cursor.saturating_add(1);
            file.record_added(new_cursor);
        } else if line.starts_with('-') {
            old_cursor = old_cursor.saturating_add(1);
            file.removed_lines.insert(old_cursor);
        } else {
            new_cursor = new_cursor.saturating_add(1);
            old_cursor = old_cursor.saturating_add(1);
        }
    }

    Ok(ChangeSet { files })
}

/// Strip quoting, `a/`/`b/` prefixes, and a trailing tab-separated timestamp.
fn parse_path(raw: &str) -> String {
    let raw = raw.split('\t').next().unwrap_or(raw);
    let normalized = raw.trim().trim_matches('"');

    if normalized == DEV_NULL {
        return DEV_NULL.to_string();
    }

    normalized
        .strip_prefix("a/")
        .or_else(|| normalized.strip_prefix("b/"))
        .unwrap_or(normalized)
        .to_string()
}

/// Parse `@@ -old[,count] +new[,count] @@`.
///
/// Returns `Ok(None)` for headers too short to carry a post-image range.
fn parse_hunk_header(line: &str, line_no: usize) -> Result<Option<HunkRange>, DifftronError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 3 {
        return Ok(None);
    }
    let Some(new) = parts[2].strip_prefix('+') else {
        return Ok(None);
    };

    let malformed = || DifftronError::MalformedHunkHeader {
        line: line_no,
        header: line.to_string(),
    };

    let (new_start, new_count) = parse_range(new).ok_or_else(malformed)?;
    let (old_start, old_count) = match parts[1].strip_prefix('-') {
        Some(old) => parse_range(old).ok_or_else(malformed)?,
        None => (new_start, 0),
    };

    Ok(Some(HunkRange {
        old_start,
        old_count,
        new_start,
        new_count,
    }))
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(set: &BTreeSet<u32>) -> Vec<u32> {
        set.iter().copied().collect()
    }

    #[test]
    fn empty_diff_returns_empty_set() {
        let changes = parse_unified_diff("").unwrap();
        assert!(changes.is_empty());
        assert!(!changes.has_changes());
    }

    #[test]
    fn context_only_hunk_has_no_changed_lines() {
        let diff = "\
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,3 @@
 fn a() {}
 fn b() {}
 fn c() {}
";
        let changes = parse_unified_diff(diff).unwrap();
        assert!(changes.changed_lines("src/lib.rs").unwrap().is_empty());
        assert!(!changes.has_changes());
        assert_eq!(changes.changed_files().count(), 0);
    }

    #[test]
    fn added_lines_follow_post_image_numbering() {
        let diff = "\
diff --git a/src/main.rs b/src/main.rs
index abc1234..def5678 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -5,3 +5,5 @@
 fn main() {
+    let x = 1;
+    let y = 2;
 }
";
        let changes = parse_unified_diff(diff).unwrap();
        let added = changes.added_lines("src/main.rs").unwrap();
        assert_eq!(lines(added), vec![6, 7]);
        assert_eq!(changes.changed_lines("src/main.rs"), Some(added));
    }

    #[test]
    fn header_without_comma_parses_identically() {
        let with_comma = "\
--- a/f.rs
+++ b/f.rs
@@ -3,1 +3,1 @@
-old
+new
";
        let without_comma = "\
--- a/f.rs
+++ b/f.rs
@@ -3 +3 @@
-old
+new
";
        let a = parse_unified_diff(with_comma).unwrap();
        let b = parse_unified_diff(without_comma).unwrap();
        assert_eq!(a, b);
        assert_eq!(lines(a.changed_lines("f.rs").unwrap()), vec![3]);
        assert_eq!(lines(a.removed_lines("f.rs").unwrap()), vec![3]);
    }

    #[test]
    fn removed_lines_do_not_advance_post_image_cursor() {
        let diff = "\
--- a/f.rs
+++ b/f.rs
@@ -10,4 +10,3 @@
 keep
-gone one
-gone two
+replacement
 keep
";
        let changes = parse_unified_diff(diff).unwrap();
        assert_eq!(lines(changes.changed_lines("f.rs").unwrap()), vec![11]);
        assert_eq!(lines(changes.removed_lines("f.rs").unwrap()), vec![11, 12]);
    }

    #[test]
    fn multiple_hunks_reset_the_cursor() {
        let diff = "\
--- a/lib.rs
+++ b/lib.rs
@@ -1,3 +1,4 @@
 fn foo() {
+    bar();
 }
@@ -10,3 +11,4 @@
 fn baz() {
+    qux();
 }
";
        let changes = parse_unified_diff(diff).unwrap();
        assert_eq!(lines(changes.changed_lines("lib.rs").unwrap()), vec![2, 12]);
    }

    #[test]
    fn multiple_files() {
        let diff = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1 +1,2 @@
 line1
+line2
diff --git a/b.rs b/b.rs
--- a/b.rs
+++ b/b.rs
@@ -1 +1,2 @@
 line1
+line2
";
        let changes = parse_unified_diff(diff).unwrap();
        let paths: Vec<&str> = changes.files().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.rs", "b.rs"]);
        assert_eq!(changes.total_changed_lines(), 2);
    }

    #[test]
    fn new_file_is_classified_from_pre_image() {
        let diff = "\
diff --git a/new.rs b/new.rs
new file mode 100644
--- /dev/null
+++ b/new.rs
@@ -0,0 +1,3 @@
+fn hello() {
+    println!(\"new\");
+}
";
        let changes = parse_unified_diff(diff).unwrap();
        assert!(changes.is_new_file("new.rs"));
        assert!(!changes.is_modified_file("new.rs"));
        assert_eq!(lines(changes.added_lines("new.rs").unwrap()), vec![1, 2, 3]);
    }

    #[test]
    fn modified_file_is_never_new() {
        let diff = "\
--- a/old.rs
+++ b/old.rs
@@ -1 +1,2 @@
 a
+b
";
        let changes = parse_unified_diff(diff).unwrap();
        assert!(changes.is_modified_file("old.rs"));
        assert!(!changes.is_new_file("old.rs"));
    }

    #[test]
    fn deleted_file_gets_no_entry() {
        let diff = "\
diff --git a/old.rs b/old.rs
deleted file mode 100644
--- a/old.rs
+++ /dev/null
@@ -1,3 +0,0 @@
-fn goodbye() {
-    println!(\"old\");
-}
diff --git a/kept.rs b/kept.rs
--- a/kept.rs
+++ b/kept.rs
@@ -1 +1,2 @@
 a
+b
";
        let changes = parse_unified_diff(diff).unwrap();
        assert!(changes.file("old.rs").is_none());
        assert!(changes.file("/dev/null").is_none());
        assert_eq!(lines(changes.changed_lines("kept.rs").unwrap()), vec![2]);
    }

    #[test]
    fn deletions_only_file_is_not_a_changed_file() {
        let diff = "\
--- a/del.rs
+++ b/del.rs
@@ -1,3 +1,1 @@
 keep
-line2
-line3
";
        let changes = parse_unified_diff(diff).unwrap();
        assert_eq!(changes.changed_files().count(), 0);
        assert_eq!(lines(changes.removed_lines("del.rs").unwrap()), vec![2, 3]);
    }

    #[test]
    fn non_numeric_header_is_fatal() {
        let diff = "\
--- a/f.rs
+++ b/f.rs
@@ -1,2 +1,2 @@
+ok
@@ -5,2 +x,3 @@
+never
";
        let err = parse_unified_diff(diff).unwrap_err();
        match err {
            DifftronError::MalformedHunkHeader { line, header } => {
                assert_eq!(line, 5);
                assert!(header.contains("+x,3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_numeric_count_is_fatal() {
        let diff = "\
--- a/f.rs
+++ b/f.rs
@@ -1,two +1,2 @@
";
        assert!(matches!(
            parse_unified_diff(diff),
            Err(DifftronError::MalformedHunkHeader { line: 3, .. })
        ));
    }

    #[test]
    fn short_header_is_skipped() {
        let diff = "\
--- a/f.rs
+++ b/f.rs
@@ junk
+not counted
@@ -1 +1,2 @@
 a
+b
";
        let changes = parse_unified_diff(diff).unwrap();
        assert_eq!(lines(changes.changed_lines("f.rs").unwrap()), vec![2]);
    }

    #[test]
    fn no_newline_marker_is_ignored() {
        let diff = "\
--- a/f.rs
+++ b/f.rs
@@ -1 +1 @@
-old
\\ No newline at end of file
+new
\\ No newline at end of file
";
        let changes = parse_unified_diff(diff).unwrap();
        assert_eq!(lines(changes.changed_lines("f.rs").unwrap()), vec![1]);
    }

    #[test]
    fn removed_line_starting_with_dashes_stays_in_hunk() {
        let diff = "\
--- a/q.sql
+++ b/q.sql
@@ -1,3 +1,3 @@
 select 1;
--- old comment
+-- new comment
 select 2;
";
        let changes = parse_unified_diff(diff).unwrap();
        assert_eq!(lines(changes.changed_lines("q.sql").unwrap()), vec![2]);
        assert_eq!(lines(changes.removed_lines("q.sql").unwrap()), vec![2]);
    }

    #[test]
    fn binary_files_produce_no_entry() {
        let diff = "\
diff --git a/image.png b/image.png
Binary files a/image.png and b/image.png differ
diff --git a/code.rs b/code.rs
--- a/code.rs
+++ b/code.rs
@@ -1 +1,2 @@
 line1
+line2
";
        let changes = parse_unified_diff(diff).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes.file("code.rs").is_some());
    }

    #[test]
    fn parse_path_handles_quotes_and_timestamps() {
        assert_eq!(parse_path("\"a/src/my file.rs\""), "src/my file.rs");
        assert_eq!(parse_path("b/src/x.rs\t2024-01-01 00:00:00"), "src/x.rs");
        assert_eq!(parse_path("/dev/null"), DEV_NULL);
        assert_eq!(parse_path("plain.rs"), "plain.rs");
    }

    #[test]
    fn retain_files_drops_excluded_paths() {
        let mut changes: ChangeSet = [
            FileChange::new("src/a.rs", false).with_added_lines([1]),
            FileChange::new("gen/b.rs", true).with_added_lines([1, 2]),
        ]
        .into_iter()
        .collect();
        changes.retain_files(|f| !f.path.starts_with("gen/"));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.total_changed_lines(), 1);
    }

    #[test]
    fn file_change_display() {
        let change = FileChange::new("src/x.rs", true).with_added_lines([1, 2]);
        assert_eq!(change.to_string(), "src/x.rs (new, +2 -0)");
    }

    #[test]
    fn change_set_serializes_camel_case() {
        let changes: ChangeSet = [FileChange::new("a.rs", true).with_added_lines([4])]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&changes).unwrap();
        let file = &json["files"]["a.rs"];
        assert_eq!(file["changedLines"], serde_json::json!([4]));
        assert_eq!(file["isNewFile"], serde_json::json!(true));
        assert_eq!(file["isModifiedFile"], serde_json::json!(false));
    }

    #[test]
    fn real_world_fixture() {
        let diff = include_str!("../tests/fixtures/simple.diff");
        let changes = parse_unified_diff(diff).unwrap();
        assert!(changes.has_changes());
        assert!(changes.is_new_file("src/report.rs"));
        assert!(changes.is_modified_file("src/lib.rs"));
        assert!(changes.file("src/legacy.rs").is_none());
    }
}
