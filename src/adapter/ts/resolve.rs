//! Module specifier resolution for the TS/JS adapter.
//!
//! Specifiers resolve through the discovered TS configuration
//! (`compilerOptions.baseUrl` + `paths` aliases) and fall back to a relative
//! resolver trying each of `.ts .tsx .js .jsx .d.ts` then `index.*` under a
//! directory. Only targets inside the workspace root are returned.

use std::path::Path;

use crate::paths::{canonicalize_logical, extension, is_within, parent};

/// Extension probe order for extensionless specifiers.
const RESOLVE_EXTS: &[&str] = &["ts", "tsx", "js", "jsx", "d.ts"];

/// Extensions the adapter indexes.
pub const TS_SOURCE_EXTS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Where the compiler options came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TsConfigSource {
    /// `tsconfig.json` at the workspace root.
    Standard,
    /// `tsconfig.base.json` fallback.
    Base,
    /// Synthesized defaults: allowJs, jsx preserved, modern-node resolution.
    Defaults,
}

impl TsConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "tsconfig.json",
            Self::Base => "tsconfig.base.json",
            Self::Defaults => "defaults",
        }
    }
}

pub struct TsResolver {
    workspace_root: String,
    /// Absolute base for non-relative specifiers.
    base_url: String,
    /// `(prefix-without-star, absolute-target-without-star)` pairs from
    /// `compilerOptions.paths`, most specific first.
    aliases: Vec<(String, String)>,
    pub config_source: TsConfigSource,
}

impl TsResolver {
    /// Discover the TS configuration for a workspace, preferring the
    /// standard name, else the base variant, else synthesized defaults.
    pub fn discover(workspace_root: &str) -> Self {
        let root = Path::new(workspace_root);
        for (name, source) in [
            ("tsconfig.json", TsConfigSource::Standard),
            ("tsconfig.base.json", TsConfigSource::Base),
        ] {
            let path = root.join(name);
            if !path.exists() {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok());
            let Some(value) = parsed else {
                // Unparseable tsconfig (comments, trailing commas): aliases
                // are lost but relative resolution still works.
                tracing::debug!(path = %path.display(), "unparseable ts config, using defaults");
                continue;
            };
            return Self::from_value(workspace_root, &value, source);
        }
        Self {
            workspace_root: workspace_root.to_string(),
            base_url: workspace_root.to_string(),
            aliases: Vec::new(),
            config_source: TsConfigSource::Defaults,
        }
    }

    fn from_value(workspace_root: &str, value: &serde_json::Value, source: TsConfigSource) -> Self {
        let compiler = value.get("compilerOptions");
        let base_url_rel = compiler
            .and_then(|c| c.get("baseUrl"))
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        let base_url =
            canonicalize_logical(Path::new(base_url_rel), Path::new(workspace_root));

        let mut aliases: Vec<(String, String)> = Vec::new();
        if let Some(paths) = compiler
            .and_then(|c| c.get("paths"))
            .and_then(|p| p.as_object())
        {
            for (alias, targets) in paths {
                let Some(target) = targets
                    .as_array()
                    .and_then(|arr| arr.first())
                    .and_then(|v| v.as_str())
                else {
                    continue;
                };
                let prefix = alias.trim_end_matches('*').to_string();
                let target_rel = target.replace('\\', "/");
                let target_prefix = target_rel.trim_end_matches('*').to_string();
                let target_abs =
                    canonicalize_logical(Path::new(&target_prefix), Path::new(&base_url));
                aliases.push((prefix, target_abs));
            }
        }
        // Longest prefix first so `@app/core/*` beats `@app/*`.
        aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));

        Self {
            workspace_root: workspace_root.to_string(),
            base_url,
            aliases,
            config_source: source,
        }
    }

    /// Resolve a module specifier from `from_file` (absolute canonical) to
    /// an absolute canonical path inside the workspace, or None.
    pub fn resolve(&self, spec: &str, from_file: &str) -> Option<String> {
        let candidate = if spec.starts_with('.') {
            canonicalize_logical(Path::new(spec), Path::new(parent(from_file)))
        } else if let Some((prefix, target)) = self
            .aliases
            .iter()
            .find(|(prefix, _)| spec == prefix.trim_end_matches('/') || spec.starts_with(prefix.as_str()))
        {
            let rest = spec.strip_prefix(prefix.as_str()).unwrap_or("");
            canonicalize_logical(Path::new(rest), Path::new(target))
        } else if spec.starts_with('/') {
            spec.to_string()
        } else {
            // Bare specifier: baseUrl lookup covers tsconfig-rooted imports;
            // package imports fall out at the containment check below.
            canonicalize_logical(Path::new(spec), Path::new(&self.base_url))
        };

        let resolved = resolve_with_extensions(&candidate)?;
        is_within(&resolved, &self.workspace_root).then_some(resolved)
    }
}

/// Try the candidate as-is (when it carries a source extension), then with
/// each probe extension, then as a directory with `index.*`.
fn resolve_with_extensions(candidate: &str) -> Option<String> {
    let path = Path::new(candidate);
    if !extension(candidate).is_empty() && path.is_file() {
        return Some(candidate.to_string());
    }
    for ext in RESOLVE_EXTS {
        let with_ext = format!("{}.{}", candidate, ext);
        if Path::new(&with_ext).is_file() {
            return Some(with_ext);
        }
    }
    if path.is_dir() {
        for ext in RESOLVE_EXTS {
            let index = format!("{}/index.{}", candidate, ext);
            if Path::new(&index).is_file() {
                return Some(index);
            }
        }
    }
    None
}
