//! Configuration file support.
//!
//! A JSON file `repo-slice.json` at the repo root, optionally overridden
//! per workspace by `<workspace>/.repo-slice/config.json`. Overrides are
//! per-key; arrays are replaced, not merged. Unknown keys are ignored.

use std::path::Path;

use serde::Deserialize;

use crate::error::SliceError;

/// Test-inclusion policy for expansion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeTests {
    #[default]
    Auto,
    True,
    False,
}

impl IncludeTests {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(Self::Auto),
            "true" => Some(Self::True),
            "false" => Some(Self::False),
            _ => None,
        }
    }
}

/// Workspace discovery mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspacesMode {
    #[default]
    Auto,
    All,
}

/// Default patterns flagged by redaction. Matched case-insensitively per
/// line of bundle content.
pub const DEFAULT_REDACT_PATTERNS: &[&str] = &[
    "api_key",
    "apikey",
    "api-key",
    "secret",
    "token",
    "password",
    "passwd",
    "authorization: bearer",
    "BEGIN RSA PRIVATE KEY",
    "BEGIN PRIVATE KEY",
    "BEGIN OPENSSH PRIVATE KEY",
];

/// Resolved configuration after layering repo and workspace files.
#[derive(Clone, Debug)]
pub struct Config {
    pub budget_chars: usize,
    pub depth: usize,
    pub include_tests: IncludeTests,
    pub ignore: Vec<String>,
    pub workspaces_mode: WorkspacesMode,
    pub python_import_roots: Vec<String>,
    pub redact_enabled: bool,
    pub redact_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            budget_chars: 28_000,
            depth: 2,
            include_tests: IncludeTests::Auto,
            ignore: Vec::new(),
            workspaces_mode: WorkspacesMode::Auto,
            python_import_roots: vec!["src".to_string(), ".".to_string()],
            redact_enabled: false,
            redact_patterns: DEFAULT_REDACT_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Raw on-disk shape. Every key optional so layering can distinguish
/// "absent" from "set to default".
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    budget_chars: Option<usize>,
    depth: Option<usize>,
    include_tests: Option<IncludeTests>,
    ignore: Option<Vec<String>>,
    workspaces: Option<RawWorkspaces>,
    redact: Option<RawRedact>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWorkspaces {
    mode: Option<WorkspacesMode>,
    python_import_roots: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRedact {
    enabled: Option<bool>,
    patterns: Option<Vec<String>>,
}

impl Config {
    /// Load the repo-root configuration. A missing file yields defaults; an
    /// unreadable or malformed file is a hard config error.
    pub fn load(repo_root: &Path) -> Result<Self, SliceError> {
        let mut config = Self::default();
        let path = repo_root.join("repo-slice.json");
        if let Some(raw) = read_raw(&path)? {
            config.apply(raw);
        }
        Ok(config)
    }

    /// Layer a workspace-local `.repo-slice/config.json` on top, per-key.
    pub fn with_workspace_overrides(&self, workspace_root: &Path) -> Result<Self, SliceError> {
        let mut config = self.clone();
        let path = workspace_root.join(".repo-slice").join("config.json");
        if let Some(raw) = read_raw(&path)? {
            config.apply(raw);
        }
        Ok(config)
    }

    fn apply(&mut self, raw: RawConfig) {
        if let Some(v) = raw.budget_chars {
            self.budget_chars = v;
        }
        if let Some(v) = raw.depth {
            self.depth = v;
        }
        if let Some(v) = raw.include_tests {
            self.include_tests = v;
        }
        if let Some(v) = raw.ignore {
            self.ignore = v;
        }
        if let Some(ws) = raw.workspaces {
            if let Some(v) = ws.mode {
                self.workspaces_mode = v;
            }
            if let Some(v) = ws.python_import_roots {
                self.python_import_roots = v;
            }
        }
        if let Some(redact) = raw.redact {
            if let Some(v) = redact.enabled {
                self.redact_enabled = v;
            }
            if let Some(v) = redact.patterns {
                self.redact_patterns = v;
            }
        }
    }
}

fn read_raw(path: &Path) -> Result<Option<RawConfig>, SliceError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| SliceError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let raw = serde_json::from_str(&content)
        .map_err(|e| SliceError::Config(format!("malformed {}: {}", path.display(), e)))?;
    Ok(Some(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_file() {
        let dir = TempDir::new().expect("tempdir");
        let config = Config::load(dir.path()).expect("load");
        assert_eq!(config.budget_chars, 28_000);
        assert_eq!(config.depth, 2);
        assert_eq!(config.include_tests, IncludeTests::Auto);
        assert_eq!(config.python_import_roots, vec!["src", "."]);
        assert!(!config.redact_enabled);
    }

    #[test]
    fn workspace_override_replaces_arrays() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(
            dir.path().join("repo-slice.json"),
            r#"{"ignore": ["a/**", "b/**"], "depth": 3}"#,
        )
        .expect("write root config");
        let ws = dir.path().join("pkg");
        std::fs::create_dir_all(ws.join(".repo-slice")).expect("mkdir");
        std::fs::write(
            ws.join(".repo-slice/config.json"),
            r#"{"ignore": ["c/**"]}"#,
        )
        .expect("write ws config");

        let root = Config::load(dir.path()).expect("load");
        let layered = root.with_workspace_overrides(&ws).expect("layer");
        assert_eq!(layered.ignore, vec!["c/**"]);
        // Keys the workspace file does not set keep the repo-level value.
        assert_eq!(layered.depth, 3);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("repo-slice.json"), "{not json").expect("write");
        let err = Config::load(dir.path()).expect_err("should fail");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(
            dir.path().join("repo-slice.json"),
            r#"{"budgetChars": 1000, "futureKey": {"x": 1}}"#,
        )
        .expect("write");
        let config = Config::load(dir.path()).expect("load");
        assert_eq!(config.budget_chars, 1000);
    }
}
