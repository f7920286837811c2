//! Ignore-pattern matching over repo-relative paths.

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Directories and files excluded from analysis regardless of configuration.
pub const DEFAULT_IGNORES: &[&str] = &[
    "**/node_modules/**",
    "**/.git/**",
    "**/dist/**",
    "**/build/**",
    "**/coverage/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/venv/**",
    "**/.next/**",
    "**/target/**",
    "**/.repo-slice/**",
    "**/*.min.js",
];

/// Compiled ignore set, matched against repo-relative POSIX paths.
pub struct IgnoreSet {
    set: GlobSet,
}

impl IgnoreSet {
    /// Build from configured patterns plus the defaults. Invalid globs are
    /// reported on stderr and skipped, matching how the teacher corpus treats
    /// user-supplied patterns.
    pub fn build(patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pat in DEFAULT_IGNORES.iter().map(|s| s.to_string()).chain(
            patterns
                .iter()
                .map(|p| normalize_pattern(p)),
        ) {
            match Glob::new(&pat) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => eprintln!("[repo-slice][warn] invalid ignore glob '{}': {}", pat, err),
            }
        }
        let set = builder.build().unwrap_or_else(|_| GlobSet::empty());
        Self { set }
    }

    pub fn is_ignored(&self, repo_relative: &str) -> bool {
        self.set.is_match(repo_relative)
    }
}

/// Bare directory names become recursive globs so `node_modules` in a config
/// behaves like `.gitignore` would treat it.
fn normalize_pattern(pat: &str) -> String {
    let pat = pat.trim().trim_end_matches('/');
    if pat.contains('*') || pat.contains('/') {
        pat.to_string()
    } else {
        format!("**/{}/**", pat)
    }
}
