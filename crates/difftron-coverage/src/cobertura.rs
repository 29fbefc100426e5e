//! Cobertura XML reader.
//!
//! Scans the document tag by tag instead of building a tree. Only the
//! elements that carry line data are interpreted:
//!
//! ```text
//! <coverage>
//!   <sources><source>/ci/project/src</source></sources>
//!   <packages><package><classes>
//!     <class filename="pkg/mod.py">
//!       <methods><method><lines><line number="3" hits="1"/></lines></method></methods>
//!       <lines><line number="3" hits="2"/><line number="4" hits="0"/></lines>
//!     </class>
//!   </classes></package></packages>
//! </coverage>
//! ```

use std::collections::BTreeMap;

use difftron_core::DifftronError;

use crate::model::CoverageReport;
use crate::options::{FileProbe, ParseOptions};
use crate::paths::normalize;

/// Parse Cobertura XML text.
///
/// Each class filename is resolved against the declared `<source>` roots and
/// normalized, so keys are repository-relative where the roots allow it.
///
/// # Errors
///
/// Returns [`DifftronError::UnparseableCoverage`] if there is no `<coverage`
/// root element.
///
/// # Examples
///
/// ```
/// use difftron_coverage::{cobertura, ParseOptions};
///
/// let xml = r#"<coverage><packages><package><classes>
///   <class filename="app/models.py"><lines>
///     <line number="1" hits="3"/><line number="2" hits="0"/>
///   </lines></class>
/// </classes></package></packages></coverage>"#;
/// let report = cobertura::parse(xml, &ParseOptions::default()).unwrap();
/// assert!(report.is_line_covered("app/models.py", 1));
/// assert!(!report.is_line_covered("app/models.py", 2));
/// ```
pub fn parse(content: &str, options: &ParseOptions) -> Result<CoverageReport, DifftronError> {
    if !content.contains("<coverage") {
        return Err(DifftronError::UnparseableCoverage {
            format: "cobertura".into(),
            reason: "missing <coverage> root element".into(),
        });
    }

    let mut report = CoverageReport::default();
    let mut sources: Vec<String> = Vec::new();
    let mut class: Option<ClassLines> = None;
    let mut in_methods = false;

    for tag in Tags::new(content) {
        match (tag.name, tag.closing) {
            ("source", false) if !tag.self_closing => {
                let text = unescape(content[tag.end..].split('<').next().unwrap_or("").trim());
                if !text.is_empty() {
                    sources.push(text);
                }
            }
            ("class", false) => {
                if let Some(done) = class.take() {
                    done.commit(&mut report, &sources, options);
                }
                match attribute(tag.body, "filename") {
                    Some(filename) => {
                        let lines = ClassLines::new(filename);
                        if tag.self_closing {
                            lines.commit(&mut report, &sources, options);
                        } else {
                            class = Some(lines);
                        }
                    }
                    None => tracing::trace!("skipping class without filename"),
                }
                in_methods = false;
            }
            ("class", true) => {
                if let Some(done) = class.take() {
                    done.commit(&mut report, &sources, options);
                }
                in_methods = false;
            }
            ("methods", false) => in_methods = !tag.self_closing,
            ("methods", true) => in_methods = false,
            ("line", false) => {
                let Some(current) = class.as_mut() else {
                    continue;
                };
                let number = attribute(tag.body, "number").and_then(|n| n.parse::<u32>().ok());
                let hits = attribute(tag.body, "hits").and_then(|h| h.parse::<u64>().ok());
                let (Some(number), Some(hits)) = (number, hits) else {
                    tracing::trace!(tag = tag.body, "skipping malformed cobertura line");
                    continue;
                };
                let target = if in_methods {
                    &mut current.method_lines
                } else {
                    &mut current.class_lines
                };
                let slot = target.entry(number).or_insert(0);
                *slot = (*slot).max(hits);
            }
            _ => {}
        }
    }

    if let Some(done) = class.take() {
        done.commit(&mut report, &sources, options);
    }

    tracing::debug!(
        files = report.len(),
        sources = sources.len(),
        "parsed cobertura report"
    );
    Ok(report)
}

struct ClassLines {
    filename: String,
    class_lines: BTreeMap<u32, u64>,
    method_lines: BTreeMap<u32, u64>,
}

impl ClassLines {
    fn new(filename: String) -> Self {
        Self {
            filename,
            class_lines: BTreeMap::new(),
            method_lines: BTreeMap::new(),
        }
    }

    fn commit(self, report: &mut CoverageReport, sources: &[String], options: &ParseOptions) {
        let resolved = resolve_source_path(&self.filename, sources, options.probe.as_ref());
        let key = normalize(&resolved, &options.repo_root);
        let record = report.touch(&key);
        for (&line, &hits) in &self.class_lines {
            record.record(line, hits);
        }
        for (&line, &hits) in &self.method_lines {
            if !self.class_lines.contains_key(&line) {
                record.record(line, hits);
            }
        }
    }
}

/// Pick the on-disk path for a class filename.
///
/// A filename that is itself a declared root is kept as is. Otherwise the
/// first `root/filename` the probe finds wins, falling back to the bare name.
fn resolve_source_path(filename: &str, sources: &[String], probe: &dyn FileProbe) -> String {
    if sources.iter().any(|s| s == filename) {
        return filename.to_string();
    }
    for source in sources {
        let root = source.replace('\\', "/");
        let root = root.trim_end_matches('/');
        if root.is_empty() {
            continue;
        }
        let candidate = format!("{root}/{}", filename.replace('\\', "/"));
        if probe.exists(&candidate) {
            return candidate;
        }
    }
    filename.to_string()
}

struct Tag<'a> {
    name: &'a str,
    body: &'a str,
    closing: bool,
    self_closing: bool,
    /// Byte offset just past the closing `>`.
    end: usize,
}

/// Iterator over element tags, skipping comments, CDATA, and declarations.
struct Tags<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Tags<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn skip_past(&mut self, from: usize, terminator: &str) -> bool {
        match self.text[from..].find(terminator) {
            Some(off) => {
                self.pos = from + off + terminator.len();
                true
            }
            None => {
                self.pos = self.text.len();
                false
            }
        }
    }
}

impl<'a> Iterator for Tags<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        let text = self.text;
        loop {
            let start = self.pos + text[self.pos..].find('<')?;
            let rest = &text[start..];

            if rest.starts_with("<!--") {
                if !self.skip_past(start, "-->") {
                    return None;
                }
                continue;
            }
            if rest.starts_with("<![CDATA[") {
                if !self.skip_past(start, "]]>") {
                    return None;
                }
                continue;
            }
            if rest.starts_with("<?") || rest.starts_with("<!") {
                if !self.skip_past(start, ">") {
                    return None;
                }
                continue;
            }

            let close = find_tag_end(rest)?;
            let end = start + close + 1;
            self.pos = end;

            let inner = &text[start + 1..start + close];
            let (closing, inner) = match inner.strip_prefix('/') {
                Some(stripped) => (true, stripped),
                None => (false, inner),
            };
            let (self_closing, inner) = match inner.trim_end().strip_suffix('/') {
                Some(stripped) => (true, stripped),
                None => (false, inner),
            };
            let name = inner
                .split(|c: char| c.is_whitespace())
                .next()
                .unwrap_or("");
            if name.is_empty() {
                continue;
            }

            return Some(Tag {
                name,
                body: inner,
                closing,
                self_closing,
                end,
            });
        }
    }
}

/// Index of the `>` that ends the tag starting at `rest[0]`, ignoring quoted `>`.
fn find_tag_end(rest: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (idx, c) in rest.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Value of `name="..."` (or single-quoted) within a tag body.
fn attribute(body: &str, name: &str) -> Option<String> {
    let mut search = 0;
    while let Some(off) = body[search..].find(name) {
        let start = search + off;
        let end = start + name.len();
        search = end;

        let preceded = body[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if !preceded {
            continue;
        }
        let Some(rest) = body[end..].trim_start().strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let quote = rest.chars().next()?;
        if quote != '"' && quote != '\'' {
            continue;
        }
        let value = &rest[1..];
        let close = value.find(quote)?;
        return Some(unescape(&value[..close]));
    }
    None
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
