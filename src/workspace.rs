//! Workspace discovery across mixed JavaScript-family and Python projects.
//!
//! JS-family workspaces come from the root `package.json` (`workspaces` as
//! an array of globs or `{packages: [...]}`) and from `pnpm-workspace.yaml`.
//! Python workspaces are detected by the presence of `pyproject.toml` or
//! `requirements.txt` at the repo root or under the configured patterns.
//! Same-root collisions merge into `WorkspaceKind::Mixed`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSetBuilder};
use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::SliceError;
use crate::paths::{canonicalize_logical, to_repo_relative};
use crate::types::{Workspace, WorkspaceKind};

/// Patterns searched for Python project manifests below the root.
pub const DEFAULT_PYTHON_WORKSPACE_PATTERNS: &[&str] = &["apps/*", "packages/*", "services/*"];

#[derive(Deserialize)]
#[serde(untagged)]
enum PackageJsonWorkspaces {
    Globs(Vec<String>),
    Object { packages: Vec<String> },
}

#[derive(Deserialize)]
struct PackageJson {
    name: Option<String>,
    workspaces: Option<PackageJsonWorkspaces>,
}

#[derive(Deserialize)]
struct PnpmWorkspace {
    packages: Option<Vec<String>>,
}

/// Discover all workspaces under `repo_root`, sorted by absolute root
/// ascending. A malformed manifest at the repo root is a hard error;
/// malformed child manifests are skipped with a debug note.
pub fn discover_workspaces(repo_root: &Path) -> Result<Vec<Workspace>, SliceError> {
    let repo_abs = canonicalize_logical(repo_root, repo_root);
    // root -> (has node manifest, has python manifest, display name)
    let mut found: BTreeMap<String, (bool, bool, Option<String>)> = BTreeMap::new();

    let mut node_globs: Vec<String> = Vec::new();

    let root_pkg = repo_root.join("package.json");
    if root_pkg.exists() {
        let manifest = read_package_json(&root_pkg).map_err(|e| {
            SliceError::Config(format!("malformed {}: {}", root_pkg.display(), e))
        })?;
        let entry = found.entry(repo_abs.clone()).or_insert((false, false, None));
        entry.0 = true;
        entry.2 = manifest.name.clone();
        match manifest.workspaces {
            Some(PackageJsonWorkspaces::Globs(globs)) => node_globs.extend(globs),
            Some(PackageJsonWorkspaces::Object { packages }) => node_globs.extend(packages),
            None => {}
        }
    }

    let pnpm_manifest = repo_root.join("pnpm-workspace.yaml");
    if pnpm_manifest.exists() {
        let content = std::fs::read_to_string(&pnpm_manifest)
            .map_err(|e| SliceError::Config(format!("cannot read {}: {}", pnpm_manifest.display(), e)))?;
        let parsed: PnpmWorkspace = serde_yaml::from_str(&content).map_err(|e| {
            SliceError::Config(format!("malformed {}: {}", pnpm_manifest.display(), e))
        })?;
        if let Some(packages) = parsed.packages {
            node_globs.extend(packages);
        }
    }

    for dir in expand_dir_globs(repo_root, &node_globs) {
        let manifest = dir.join("package.json");
        if !manifest.exists() {
            continue;
        }
        let abs = canonicalize_logical(&dir, repo_root);
        match read_package_json(&manifest) {
            Ok(pkg) => {
                let entry = found.entry(abs).or_insert((false, false, None));
                entry.0 = true;
                if entry.2.is_none() {
                    entry.2 = pkg.name;
                }
            }
            Err(err) => {
                debug!(path = %manifest.display(), %err, "skipping malformed child manifest");
            }
        }
    }

    if has_python_manifest(repo_root) {
        let entry = found.entry(repo_abs.clone()).or_insert((false, false, None));
        entry.1 = true;
    }
    let py_patterns: Vec<String> = DEFAULT_PYTHON_WORKSPACE_PATTERNS
        .iter()
        .map(|s| s.to_string())
        .collect();
    for dir in expand_dir_globs(repo_root, &py_patterns) {
        if has_python_manifest(&dir) {
            let abs = canonicalize_logical(&dir, repo_root);
            let entry = found.entry(abs).or_insert((false, false, None));
            entry.1 = true;
        }
    }

    let mut workspaces: Vec<Workspace> = found
        .into_iter()
        .map(|(root, (node, python, name))| {
            let kind = match (node, python) {
                (true, true) => WorkspaceKind::Mixed,
                (true, false) => WorkspaceKind::Node,
                _ => WorkspaceKind::Python,
            };
            let id = to_repo_relative(&root, &repo_abs);
            let name = name.unwrap_or_else(|| {
                if id == "." {
                    crate::paths::file_name(&repo_abs).to_string()
                } else {
                    crate::paths::file_name(&root).to_string()
                }
            });
            Workspace {
                id,
                name,
                root,
                kind,
            }
        })
        .collect();
    workspaces.sort_by(|a, b| a.root.cmp(&b.root));
    Ok(workspaces)
}

fn read_package_json(path: &Path) -> Result<PackageJson, serde_json::Error> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    serde_json::from_str(&content)
}

fn has_python_manifest(dir: &Path) -> bool {
    dir.join("pyproject.toml").exists() || dir.join("requirements.txt").exists()
}

/// Expand directory globs (e.g. `packages/*`) against the tree below `root`.
/// Results are sorted for determinism.
fn expand_dir_globs(root: &Path, patterns: &[String]) -> Vec<PathBuf> {
    if patterns.is_empty() {
        return Vec::new();
    }
    let mut builder = GlobSetBuilder::new();
    let mut max_depth = 1usize;
    for pat in patterns {
        let pat = pat.trim().trim_end_matches('/');
        if pat.is_empty() || pat.starts_with('!') {
            continue;
        }
        max_depth = max_depth.max(pat.split('/').count() + if pat.contains("**") { 3 } else { 0 });
        match Glob::new(pat) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => debug!(pattern = pat, %err, "skipping invalid workspace glob"),
        }
    }
    let Ok(set) = builder.build() else {
        return Vec::new();
    };
    let repo_abs = canonicalize_logical(root, root);

    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.file_type().is_dir() && name != "node_modules" && !name.starts_with('.')
        })
        .flatten()
    {
        let abs = canonicalize_logical(entry.path(), root);
        let rel = to_repo_relative(&abs, &repo_abs);
        if set.is_match(&rel) {
            dirs.push(entry.path().to_path_buf());
        }
    }
    dirs.sort();
    dirs
}
