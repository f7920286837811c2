//! Unified-diff hunk extraction.
//!
//! Reads the `+++ b/path` and `@@ -… +start,len @@` markers of a unified
//! diff (as produced by `git diff -U3 --no-color`) and maps them to
//! repo-relative absolute paths with the post-image hunk range.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::SliceError;
use crate::paths::canonicalize_logical;
use crate::types::Range;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffHunk {
    /// Absolute canonical path.
    pub file_path: String,
    /// Post-image (`+`) side of the hunk.
    pub range: Range,
}

fn regex_hunk_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -\d+(?:,\d+)? \+(\d+)(?:,(\d+))? @@").expect("valid regex literal")
    })
}

/// Parse unified-diff text into hunks, resolving paths against `repo_root`.
pub fn parse_unified_diff(content: &str, repo_root: &str) -> Vec<DiffHunk> {
    let mut hunks = Vec::new();
    let mut current_file: Option<String> = None;

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("+++ ") {
            let raw = rest.trim();
            if raw == "/dev/null" {
                current_file = None;
                continue;
            }
            let rel = raw.strip_prefix("b/").unwrap_or(raw);
            current_file = Some(canonicalize_logical(Path::new(rel), Path::new(repo_root)));
        } else if let Some(caps) = regex_hunk_header().captures(line) {
            let Some(file) = &current_file else {
                continue;
            };
            let start: usize = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(1);
            let len: usize = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(1);
            let end = start + len.max(1) - 1;
            hunks.push(DiffHunk {
                file_path: file.clone(),
                range: Range::lines(start.max(1), end.max(1)),
            });
        }
    }
    hunks
}

/// Run `git diff -U3 --no-color <revRange>` in the repo and parse its hunks.
pub fn hunks_from_git(repo_root: &str, rev_range: &str) -> Result<Vec<DiffHunk>, SliceError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .arg("diff")
        .arg("-U3")
        .arg("--no-color")
        .arg(rev_range)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| SliceError::io(format!("spawning git diff {}", rev_range), e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SliceError::io(
            format!("git diff {}", rev_range),
            std::io::Error::other(stderr.trim().to_string()),
        ));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(parse_unified_diff(&text, repo_root))
}
