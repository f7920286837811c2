//! Hand-rolled argv parser for the subcommand CLI.

use tracing::debug;

use crate::config::IncludeTests;
use crate::engine::{
    AnchorFlags, BundleFormat, GraphCommandOptions, GraphFormat, PackOptions, WorkspaceScope,
};
use crate::error::SliceError;
use crate::graph::{CollapseMode, GraphOptions, GraphType};

use super::{Command, GlobalOptions, WorkspacesFormat};

const DEFAULT_MAX_NODES: usize = 500;
const DEFAULT_MAX_EDGES: usize = 1000;

fn usage_err(message: impl Into<String>) -> SliceError {
    SliceError::Usage(message.into())
}

struct Args {
    items: Vec<String>,
    index: usize,
}

impl Args {
    fn next(&mut self) -> Option<String> {
        let item = self.items.get(self.index).cloned();
        if item.is_some() {
            self.index += 1;
        }
        item
    }

    fn value_for(&mut self, flag: &str) -> Result<String, SliceError> {
        self.next()
            .ok_or_else(|| usage_err(format!("{} requires a value", flag)))
    }

    fn number_for(&mut self, flag: &str) -> Result<usize, SliceError> {
        let raw = self.value_for(flag)?;
        raw.parse()
            .map_err(|_| usage_err(format!("{} expects a number, got '{}'", flag, raw)))
    }
}

/// Parse argv (without the program name) into a command.
pub fn parse_args(argv: &[String]) -> Result<(Command, GlobalOptions), SliceError> {
    let mut args = Args {
        items: argv.to_vec(),
        index: 0,
    };
    let Some(command) = args.next() else {
        return Ok((Command::Help, GlobalOptions::default()));
    };

    match command.as_str() {
        "pack" => parse_pack(&mut args),
        "graph" => parse_graph(&mut args),
        "workspaces" => parse_workspaces(&mut args),
        "version" | "--version" | "-V" => Ok((Command::Version, GlobalOptions::default())),
        "help" | "--help" | "-h" => Ok((Command::Help, GlobalOptions::default())),
        other => Err(usage_err(format!("unknown command '{}'", other))),
    }
}

/// Flags shared by `pack` and `graph`. Returns true when consumed.
#[allow(clippy::too_many_arguments)]
fn parse_shared_flag(
    flag: &str,
    args: &mut Args,
    anchors: &mut AnchorFlags,
    scope: &mut WorkspaceScope,
    fallback_all: &mut bool,
    depth: &mut Option<usize>,
    symbol_strict: &mut bool,
    no_cache: &mut bool,
    no_timestamp: &mut bool,
    global: &mut GlobalOptions,
) -> Result<bool, SliceError> {
    match flag {
        "--entry" => anchors.entries.push(args.value_for(flag)?),
        "--symbol" => anchors.symbols.push(args.value_for(flag)?),
        "--from-diff" => anchors.from_diff = Some(args.value_for(flag)?),
        "--from-log" => anchors.from_log = Some(args.value_for(flag)?),
        "--workspace" => {
            let value = args.value_for(flag)?;
            *scope = if value == "auto" {
                WorkspaceScope::Auto
            } else {
                WorkspaceScope::Named(value)
            };
        }
        "--all-workspaces" => *scope = WorkspaceScope::All,
        "--fallback-all" => *fallback_all = true,
        "--depth" => *depth = Some(args.number_for(flag)?),
        "--symbol-strict" => *symbol_strict = true,
        "--no-cache" => *no_cache = true,
        "--no-timestamp" => *no_timestamp = true,
        "--debug" => global.debug = true,
        "--python-engine" => {
            let engine = args.value_for(flag)?;
            if engine != "syntactic" && engine != "pyright" {
                return Err(usage_err(format!("unknown python engine '{}'", engine)));
            }
            // The pyright engine is accepted as an alias of the syntactic one.
            debug!(engine, "python engine flag accepted");
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_pack(args: &mut Args) -> Result<(Command, GlobalOptions), SliceError> {
    let mut global = GlobalOptions::default();
    let mut anchors = AnchorFlags::default();
    let mut scope = WorkspaceScope::Auto;
    let mut fallback_all = false;
    let mut depth = None;
    let mut symbol_strict = false;
    let mut no_cache = false;
    let mut no_timestamp = false;
    let mut include_tests = None;
    let mut budget_chars = None;
    let mut budget_tokens = None;
    let mut format = BundleFormat::Markdown;
    let mut show_reasons = false;
    let mut redact = false;
    let mut out = None;

    while let Some(flag) = args.next() {
        if parse_shared_flag(
            &flag,
            args,
            &mut anchors,
            &mut scope,
            &mut fallback_all,
            &mut depth,
            &mut symbol_strict,
            &mut no_cache,
            &mut no_timestamp,
            &mut global,
        )? {
            continue;
        }
        match flag.as_str() {
            "--include-tests" => {
                let value = args.value_for(&flag)?;
                include_tests = Some(
                    IncludeTests::parse(&value)
                        .ok_or_else(|| usage_err(format!("invalid --include-tests '{}'", value)))?,
                );
            }
            "--budget-chars" => budget_chars = Some(args.number_for(&flag)?),
            "--budget-tokens" => budget_tokens = Some(args.number_for(&flag)?),
            "--format" => {
                let value = args.value_for(&flag)?;
                format = match value.as_str() {
                    "md" => BundleFormat::Markdown,
                    "json" => BundleFormat::Json,
                    _ => return Err(usage_err(format!("invalid pack format '{}'", value))),
                };
            }
            "--reason" => show_reasons = true,
            "--redact" => redact = true,
            "--out" => out = Some(args.value_for(&flag)?),
            "--help" | "-h" => return Ok((Command::Help, global)),
            other => return Err(usage_err(format!("unknown pack flag '{}'", other))),
        }
    }

    let options = PackOptions {
        anchors,
        scope,
        fallback_all,
        depth,
        include_tests,
        budget_chars,
        budget_tokens,
        format,
        show_reasons,
        redact,
        no_timestamp,
        symbol_strict,
        no_cache,
    };
    Ok((Command::Pack { options, out }, global))
}

fn parse_graph(args: &mut Args) -> Result<(Command, GlobalOptions), SliceError> {
    let mut global = GlobalOptions::default();
    let mut anchors = AnchorFlags::default();
    let mut scope = WorkspaceScope::Auto;
    let mut fallback_all = false;
    let mut depth = None;
    let mut symbol_strict = false;
    let mut no_cache = false;
    let mut no_timestamp = false;
    let mut graph_type = GraphType::Imports;
    let mut include_external = false;
    let mut max_nodes = DEFAULT_MAX_NODES;
    let mut max_edges = DEFAULT_MAX_EDGES;
    let mut collapse = CollapseMode::None;
    let mut format = GraphFormat::Json;
    let mut out = None;

    while let Some(flag) = args.next() {
        if parse_shared_flag(
            &flag,
            args,
            &mut anchors,
            &mut scope,
            &mut fallback_all,
            &mut depth,
            &mut symbol_strict,
            &mut no_cache,
            &mut no_timestamp,
            &mut global,
        )? {
            continue;
        }
        match flag.as_str() {
            "--graph-type" => {
                let value = args.value_for(&flag)?;
                graph_type = GraphType::parse(&value)
                    .ok_or_else(|| usage_err(format!("invalid --graph-type '{}'", value)))?;
            }
            "--include-external" => include_external = true,
            "--max-nodes" => max_nodes = args.number_for(&flag)?,
            "--max-edges" => max_edges = args.number_for(&flag)?,
            "--collapse" => {
                let value = args.value_for(&flag)?;
                collapse = CollapseMode::parse(&value)
                    .ok_or_else(|| usage_err(format!("invalid --collapse '{}'", value)))?;
            }
            "--format" => {
                let value = args.value_for(&flag)?;
                format = match value.as_str() {
                    "json" => GraphFormat::Json,
                    "dot" => GraphFormat::Dot,
                    _ => return Err(usage_err(format!("invalid graph format '{}'", value))),
                };
            }
            "--out" => out = Some(args.value_for(&flag)?),
            "--help" | "-h" => return Ok((Command::Help, global)),
            other => return Err(usage_err(format!("unknown graph flag '{}'", other))),
        }
    }

    let options = GraphCommandOptions {
        anchors,
        scope,
        fallback_all,
        depth,
        graph: GraphOptions {
            graph_type,
            depth: depth.unwrap_or(2),
            include_external,
            max_nodes,
            max_edges,
            collapse,
        },
        format,
        no_timestamp,
        symbol_strict,
        no_cache,
    };
    Ok((Command::Graph { options, out }, global))
}

fn parse_workspaces(args: &mut Args) -> Result<(Command, GlobalOptions), SliceError> {
    let mut global = GlobalOptions::default();
    let mut format = WorkspacesFormat::Text;
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--format" => {
                let value = args.value_for(&flag)?;
                format = match value.as_str() {
                    "json" => WorkspacesFormat::Json,
                    "text" => WorkspacesFormat::Text,
                    _ => return Err(usage_err(format!("invalid workspaces format '{}'", value))),
                };
            }
            "--debug" => global.debug = true,
            "--help" | "-h" => return Ok((Command::Help, global)),
            other => return Err(usage_err(format!("unknown workspaces flag '{}'", other))),
        }
    }
    Ok((Command::Workspaces { format }, global))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(parts: &[&str]) -> Result<(Command, GlobalOptions), SliceError> {
        let argv: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
        parse_args(&argv)
    }

    #[test]
    fn pack_flags_round_trip() {
        let (command, global) = parse(&[
            "pack",
            "--entry",
            "src/cli.ts",
            "--symbol",
            "renderHelp",
            "--depth",
            "3",
            "--budget-chars",
            "9000",
            "--format",
            "json",
            "--no-timestamp",
            "--symbol-strict",
            "--debug",
        ])
        .expect("parse");
        assert!(global.debug);
        let Command::Pack { options, out } = command else {
            panic!("expected pack");
        };
        assert_eq!(options.anchors.entries, vec!["src/cli.ts"]);
        assert_eq!(options.anchors.symbols, vec!["renderHelp"]);
        assert_eq!(options.depth, Some(3));
        assert_eq!(options.budget_chars, Some(9000));
        assert_eq!(options.format, BundleFormat::Json);
        assert!(options.no_timestamp);
        assert!(options.symbol_strict);
        assert!(out.is_none());
    }

    #[test]
    fn graph_flags_round_trip() {
        let (command, _) = parse(&[
            "graph",
            "--entry",
            "src/a.ts",
            "--graph-type",
            "combined",
            "--collapse",
            "class",
            "--max-nodes",
            "5",
            "--format",
            "dot",
            "--include-external",
        ])
        .expect("parse");
        let Command::Graph { options, .. } = command else {
            panic!("expected graph");
        };
        assert_eq!(options.graph.graph_type, GraphType::Combined);
        assert_eq!(options.graph.collapse, CollapseMode::Class);
        assert_eq!(options.graph.max_nodes, 5);
        assert_eq!(options.format, GraphFormat::Dot);
        assert!(options.graph.include_external);
    }

    #[test]
    fn unknown_flag_is_usage_error() {
        let err = parse(&["pack", "--bogus"]).expect_err("should fail");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn missing_value_is_usage_error() {
        let err = parse(&["pack", "--entry"]).expect_err("should fail");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn bad_number_is_usage_error() {
        let err = parse(&["graph", "--max-nodes", "many"]).expect_err("should fail");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn workspace_scope_forms() {
        let (command, _) = parse(&["pack", "--entry", "a.ts", "--workspace", "apps/web"])
            .expect("parse");
        let Command::Pack { options, .. } = command else {
            panic!("expected pack");
        };
        assert_eq!(options.scope, WorkspaceScope::Named("apps/web".to_string()));

        let (command, _) =
            parse(&["pack", "--entry", "a.ts", "--all-workspaces"]).expect("parse");
        let Command::Pack { options, .. } = command else {
            panic!("expected pack");
        };
        assert_eq!(options.scope, WorkspaceScope::All);
    }

    #[test]
    fn python_engine_values() {
        assert!(parse(&["pack", "--entry", "a", "--python-engine", "pyright"]).is_ok());
        assert!(parse(&["pack", "--entry", "a", "--python-engine", "magic"]).is_err());
    }
}
