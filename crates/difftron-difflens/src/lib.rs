//! Unified diff parsing into per-file changed-line sets.
//!
//! Turns `git diff` output into a [`parser::ChangeSet`]: for every file the
//! diff touches, the post-change line numbers it added, the pre-change line
//! numbers it removed, and whether the file is new or modified. A
//! [`filter::ChangeFilter`] drops excluded paths before analysis.
pub mod filter;
pub mod parser;
