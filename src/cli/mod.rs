//! Subcommand-based CLI.
//!
//! `repo-slice <command> [options]` with four commands:
//! `pack`, `graph`, `workspaces`, `version`. The parser is hand-rolled;
//! malformed invocations surface as usage errors (exit 3) with the help
//! text on stderr.
//!
//! - [`parser`] - argv -> [`Command`]
//! - [`dispatch`] - command execution and output writing
//! - [`help`] - usage text

pub mod dispatch;
pub mod help;
pub mod parser;

use crate::engine::{GraphCommandOptions, PackOptions};

/// Output format for the `workspaces` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkspacesFormat {
    Json,
    Text,
}

#[derive(Clone, Debug)]
pub enum Command {
    Pack {
        options: PackOptions,
        out: Option<String>,
    },
    Graph {
        options: GraphCommandOptions,
        out: Option<String>,
    },
    Workspaces {
        format: WorkspacesFormat,
    },
    Version,
    Help,
}

/// Options that apply to every command.
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub debug: bool,
}

pub use dispatch::run;
pub use parser::parse_args;
