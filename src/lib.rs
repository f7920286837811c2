//! # repo-slice
//!
//! Deterministic context bundles and dependency graphs for mixed TS/JS and
//! Python repositories. repo-slice indexes a repository once (import graph,
//! symbol definitions, call sites, with a persistent per-workspace cache),
//! resolves user-supplied anchors (entry paths, symbol queries, diff hunks,
//! log locations), and emits either a size-bounded context bundle or a
//! typed dependency graph.
//!
//! ## Library usage
//!
//! ```rust,no_run
//! use repo_slice::engine::{AnchorFlags, BundleFormat, Engine, PackOptions, WorkspaceScope};
//! use std::path::Path;
//!
//! let engine = Engine::new(Path::new(".")).expect("repo");
//! let options = PackOptions {
//!     anchors: AnchorFlags {
//!         entries: vec!["src/cli.ts".to_string()],
//!         ..Default::default()
//!     },
//!     scope: WorkspaceScope::Auto,
//!     fallback_all: false,
//!     depth: None,
//!     include_tests: None,
//!     budget_chars: None,
//!     budget_tokens: None,
//!     format: BundleFormat::Markdown,
//!     show_reasons: false,
//!     redact: false,
//!     no_timestamp: true,
//!     symbol_strict: false,
//!     no_cache: false,
//! };
//! let bundle = engine.pack(&options).expect("bundle");
//! println!("{}", bundle);
//! ```
//!
//! ## CLI
//!
//! ```bash
//! repo-slice pack --entry src/cli.ts --depth 2 --format json
//! repo-slice graph --symbol Engine.start --graph-type combined --format dot
//! repo-slice workspaces --format json
//! ```

/// Language adapters (TypeScript/JavaScript via OXC, Python via the
/// syntactic walker) behind one closed dispatch enum.
pub mod adapter;

/// Anchor resolution: entries, symbol queries, diff hunks, log locations.
pub mod anchors;

/// Budget-bounded selection of ranked candidates.
pub mod budget;

/// Persistent per-workspace index cache.
pub mod cache;

/// Subcommand CLI: parser, dispatch, help.
pub mod cli;

/// Layered JSON configuration.
pub mod config;

/// Orchestration of the bundle and graph paths.
pub mod engine;

/// Error kinds mapped to process exit codes.
pub mod error;

/// Candidate expansion and scoring.
pub mod expand;

/// Typed dependency-graph construction.
pub mod graph;

/// Ignore-pattern matching.
pub mod ignore;

/// Path canonicalization helpers.
pub mod paths;

/// Secret redaction for bundle contents.
pub mod redact;

/// JSON/Markdown/DOT rendering.
pub mod render;

/// Core data model.
pub mod types;

/// Workspace discovery.
pub mod workspace;
