//! Structured log-line parsing.
//!
//! Recognized styles:
//! - compiler diagnostic: `path:line:col - …`
//! - module typechecker: `path:line: …`
//! - test-framework stack frame: `… (path:line:col)`
//! - test header: `FAIL path`
//! - pytest: `File "path", line N`
//! - pointer: `❯ path:line:col`
//!
//! Duplicate anchors at the same location are dropped, keeping first-seen
//! order.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::paths::canonicalize_logical;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogAnchor {
    /// Absolute canonical path.
    pub file_path: String,
    /// 1-based line; `FAIL path` headers anchor at line 1.
    pub line: usize,
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex literal")
}

fn regex_pointer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^\s*❯\s+(\S+?):(\d+):(\d+)"))
}

fn regex_pytest() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r#"File "([^"]+)", line (\d+)"#))
}

fn regex_stack_frame() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"\(([^()\s]+):(\d+):(\d+)\)"))
}

fn regex_compiler_diag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^(\S+?):(\d+):(\d+) - "))
}

fn regex_typechecker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^(\S+?):(\d+): "))
}

fn regex_fail_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^FAIL\s+(\S+)"))
}

/// Parse one line into a `(raw path, line)` pair, trying the more specific
/// styles first.
fn parse_line(line: &str) -> Option<(String, usize)> {
    if let Some(caps) = regex_pointer().captures(line) {
        return Some((caps[1].to_string(), caps[2].parse().ok()?));
    }
    if let Some(caps) = regex_pytest().captures(line) {
        return Some((caps[1].to_string(), caps[2].parse().ok()?));
    }
    if let Some(caps) = regex_compiler_diag().captures(line) {
        return Some((caps[1].to_string(), caps[2].parse().ok()?));
    }
    if let Some(caps) = regex_stack_frame().captures(line) {
        return Some((caps[1].to_string(), caps[2].parse().ok()?));
    }
    if let Some(caps) = regex_typechecker().captures(line) {
        return Some((caps[1].to_string(), caps[2].parse().ok()?));
    }
    if let Some(caps) = regex_fail_header().captures(line) {
        return Some((caps[1].to_string(), 1));
    }
    None
}

/// Parse a whole log, deduplicating per location.
pub fn parse_log(content: &str, repo_root: &str) -> Vec<LogAnchor> {
    let mut seen: HashSet<(String, usize)> = HashSet::new();
    let mut out = Vec::new();
    for line in content.lines() {
        let Some((raw, line_no)) = parse_line(line) else {
            continue;
        };
        let abs = canonicalize_logical(Path::new(&raw), Path::new(repo_root));
        if seen.insert((abs.clone(), line_no)) {
            out.push(LogAnchor {
                file_path: abs,
                line: line_no,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiler_diagnostic_style() {
        let anchors = parse_log("src/app.ts:10:5 - error TS2345: nope\n", "/repo");
        assert_eq!(
            anchors,
            vec![LogAnchor {
                file_path: "/repo/src/app.ts".to_string(),
                line: 10
            }]
        );
    }

    #[test]
    fn typechecker_style() {
        let anchors = parse_log("pkg/mod.py:42: error: bad type\n", "/repo");
        assert_eq!(anchors[0].file_path, "/repo/pkg/mod.py");
        assert_eq!(anchors[0].line, 42);
    }

    #[test]
    fn stack_frame_and_pointer_styles() {
        let log = "\
    at doWork (src/worker.ts:8:13)
 ❯ src/worker.test.ts:21:3
";
        let anchors = parse_log(log, "/repo");
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].file_path, "/repo/src/worker.ts");
        assert_eq!(anchors[1].file_path, "/repo/src/worker.test.ts");
        assert_eq!(anchors[1].line, 21);
    }

    #[test]
    fn fail_header_and_pytest_styles() {
        let log = "\
FAIL src/app.test.ts
  File \"services/api/main.py\", line 17, in handler
";
        let anchors = parse_log(log, "/repo");
        assert_eq!(anchors[0].line, 1);
        assert_eq!(anchors[1].file_path, "/repo/services/api/main.py");
        assert_eq!(anchors[1].line, 17);
    }

    #[test]
    fn duplicate_locations_are_dropped() {
        let log = "\
src/app.ts:10:5 - error one
src/app.ts:10:5 - error two
src/app.ts:11:1 - error three
";
        let anchors = parse_log(log, "/repo");
        assert_eq!(anchors.len(), 2);
    }
}
