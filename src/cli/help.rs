//! CLI usage text.

pub fn usage() -> &'static str {
    "repo-slice - deterministic context bundles and dependency graphs\n\
\n\
Usage: repo-slice <command> [options]\n\
\n\
Commands:\n  \
  pack                      Build a budget-bounded context bundle\n  \
  graph                     Build a typed dependency graph\n  \
  workspaces                List detected workspaces\n  \
  version                   Print the tool version\n\
\n\
Anchors (pack, graph):\n  \
  --entry <path>            Anchor file (repeatable)\n  \
  --symbol <query>          Symbol query: name, hint:name, Class.member (repeatable)\n  \
  --from-diff <revRange>    Anchor changed lines from git diff\n  \
  --from-log <path>         Anchor locations parsed from a log file (- for stdin)\n\
\n\
Scope:\n  \
  --workspace <auto|name|path>  Workspace selection (default auto)\n  \
  --all-workspaces          Index every detected workspace\n  \
  --fallback-all            Retry unresolved anchors over all workspaces\n\
\n\
Analysis:\n  \
  --depth <N>               Import BFS depth (default 2)\n  \
  --include-tests <auto|true|false>  Related-test candidates (default auto)\n  \
  --python-engine <syntactic|pyright>  Python analysis engine\n\
\n\
pack options:\n  \
  --budget-chars <N>        Character budget (default 28000)\n  \
  --budget-tokens <N>       Optional token budget\n  \
  --format <md|json>        Output format (default md)\n  \
  --reason                  Show per-item reasons in the index\n  \
  --redact                  Redact secret-looking lines\n  \
  --symbol-strict           Ambiguous symbols are an error\n\
\n\
graph options:\n  \
  --graph-type <imports|calls|combined>  Graph flavor (default imports)\n  \
  --include-external        Keep nodes outside every workspace\n  \
  --max-nodes <N>           Node cap (default 500)\n  \
  --max-edges <N>           Edge cap (default 1000)\n  \
  --collapse <none|external|file|class>  Collapse mode (default none)\n  \
  --format <json|dot>       Output format (default json)\n\
\n\
Output:\n  \
  --out <path>              Write output to a file instead of stdout\n  \
  --no-timestamp            Omit generatedAt for byte-identical runs\n  \
  --no-cache                Skip cache reads (still writes)\n  \
  --debug                   Verbose diagnostics on stderr\n"
}
