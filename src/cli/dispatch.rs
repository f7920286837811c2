//! Command execution.

use std::io::Write;
use std::path::Path;

use serde_json::json;

use crate::engine::Engine;
use crate::error::{Result, SliceError};
use crate::paths::to_repo_relative;

use super::{Command, WorkspacesFormat, help};

/// Run a parsed command from the current directory as repo root.
pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Version => {
            println!("repo-slice {}", crate::cache::tool_version());
            Ok(())
        }
        Command::Help => {
            print!("{}", help::usage());
            Ok(())
        }
        Command::Workspaces { format } => {
            let engine = Engine::new(Path::new("."))?;
            let output = render_workspaces(&engine, format);
            print!("{}", output);
            Ok(())
        }
        Command::Pack { options, out } => {
            let engine = Engine::new(Path::new("."))?;
            let output = engine.pack(&options)?;
            emit(&output, out.as_deref())
        }
        Command::Graph { options, out } => {
            let engine = Engine::new(Path::new("."))?;
            let output = engine.graph(&options)?;
            emit(&output, out.as_deref())
        }
    }
}

fn emit(output: &str, out: Option<&str>) -> Result<()> {
    match out {
        None => {
            print!("{}", output);
            Ok(())
        }
        Some(path) => std::fs::write(path, output)
            .map_err(|e| SliceError::io(format!("writing {}", path), e)),
    }
}

fn render_workspaces(engine: &Engine, format: WorkspacesFormat) -> String {
    match format {
        WorkspacesFormat::Json => {
            let entries: Vec<serde_json::Value> = engine
                .workspaces()
                .iter()
                .map(|w| {
                    json!({
                        "id": w.id,
                        "name": w.name,
                        "kind": w.kind,
                        "root": to_repo_relative(&w.root, engine.repo_root()),
                    })
                })
                .collect();
            let mut out = serde_json::to_string_pretty(&json!({ "workspaces": entries }))
                .unwrap_or_else(|_| "{}".to_string());
            out.push('\n');
            out
        }
        WorkspacesFormat::Text => {
            let mut out = String::new();
            for w in engine.workspaces() {
                let kind = match w.kind {
                    crate::types::WorkspaceKind::Node => "node",
                    crate::types::WorkspaceKind::Python => "python",
                    crate::types::WorkspaceKind::Mixed => "mixed",
                };
                out.push_str(&format!("{}  {}  {}\n", w.id, kind, w.name));
            }
            if out.is_empty() {
                out.push_str("no workspaces detected\n");
            }
            out
        }
    }
}

/// Print an error the way the exit-code contract expects: usage errors get
/// the help text, anchor failures get per-anchor detail.
pub fn report_error(err: &SliceError) {
    match err {
        SliceError::Usage(message) => {
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "[repo-slice][error] {}", message);
            let _ = write!(stderr, "\n{}", help::usage());
        }
        other => {
            eprintln!("[repo-slice][error] {}", other);
        }
    }
}
