//! End-to-end CLI tests over the mixed-language fixture tree.
//!
//! The fixture is copied into a temp dir per test so cache writes under
//! `.repo-slice/` never touch the checked-in tree.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/mixed")
}

fn copy_tree(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).expect("create target dir");
    for entry in walk(from) {
        let rel = entry.strip_prefix(from).expect("relative");
        let target = to.join(rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&target).expect("mkdir");
        } else {
            std::fs::create_dir_all(target.parent().expect("parent")).expect("mkdir");
            std::fs::copy(&entry, &target).expect("copy");
        }
    }
}

fn walk(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).expect("read_dir") {
            let path = entry.expect("entry").path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            out.push(path);
        }
    }
    out
}

fn fixture() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    copy_tree(&fixtures_path(), dir.path());
    dir
}

fn repo_slice(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("repo-slice").expect("binary");
    cmd.current_dir(dir.path());
    cmd
}

mod cli_basics {
    use super::*;

    #[test]
    fn shows_help() {
        let dir = fixture();
        repo_slice(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("repo-slice"))
            .stdout(predicate::str::contains("pack"))
            .stdout(predicate::str::contains("graph"));
    }

    #[test]
    fn shows_version() {
        let dir = fixture();
        repo_slice(&dir)
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn unknown_command_exits_3() {
        let dir = fixture();
        repo_slice(&dir)
            .arg("shred")
            .assert()
            .code(3)
            .stderr(predicate::str::contains("unknown command"));
    }

    #[test]
    fn unknown_flag_exits_3_with_help() {
        let dir = fixture();
        repo_slice(&dir)
            .args(["pack", "--bogus"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Usage: repo-slice"));
    }

    #[test]
    fn pack_without_anchors_exits_3() {
        let dir = fixture();
        repo_slice(&dir)
            .arg("pack")
            .assert()
            .code(3)
            .stderr(predicate::str::contains("at least one anchor"));
    }
}

mod workspaces_cmd {
    use super::*;

    #[test]
    fn text_listing_shows_mixed_kind() {
        let dir = fixture();
        repo_slice(&dir)
            .args(["workspaces"])
            .assert()
            .success()
            .stdout(predicate::str::contains("mixed"))
            .stdout(predicate::str::contains("fixture-app"));
    }

    #[test]
    fn json_listing_is_valid() {
        let dir = fixture();
        let output = repo_slice(&dir)
            .args(["workspaces", "--format", "json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let parsed: serde_json::Value =
            serde_json::from_slice(&output).expect("valid workspaces json");
        assert_eq!(parsed["workspaces"][0]["id"], ".");
        assert_eq!(parsed["workspaces"][0]["kind"], "mixed");
    }
}

mod pack_cmd {
    use super::*;

    #[test]
    fn bundle_covers_entry_and_direct_imports() {
        let dir = fixture();
        let output = repo_slice(&dir)
            .args([
                "pack",
                "--entry",
                "src/cli.ts",
                "--depth",
                "1",
                "--no-timestamp",
                "--format",
                "json",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let parsed: serde_json::Value = serde_json::from_slice(&output).expect("bundle json");
        let paths: Vec<&str> = parsed["items"]
            .as_array()
            .expect("items")
            .iter()
            .map(|i| i["filePath"].as_str().expect("filePath"))
            .collect();
        assert!(paths.contains(&"src/cli.ts"));
        assert!(paths.contains(&"src/commands/pack.ts"));
        assert!(paths.contains(&"src/commands/help.ts"));
        assert!(parsed["meta"]["budget"]["usedChars"].as_u64().expect("usedChars") > 0);
    }

    #[test]
    fn byte_identical_across_runs() {
        let dir = fixture();
        let run = || {
            repo_slice(&dir)
                .args([
                    "pack",
                    "--entry",
                    "src/cli.ts",
                    "--no-timestamp",
                    "--format",
                    "json",
                ])
                .assert()
                .success()
                .get_output()
                .stdout
                .clone()
        };
        let first = run();
        // Second run goes through the freshly written cache.
        let second = run();
        assert_eq!(first, second);
        assert!(dir.path().join(".repo-slice/cache").is_dir());
    }

    #[test]
    fn markdown_format_has_index_and_fences() {
        let dir = fixture();
        repo_slice(&dir)
            .args(["pack", "--entry", "src/cli.ts", "--no-timestamp", "--reason"])
            .assert()
            .success()
            .stdout(predicate::str::contains("## Index"))
            .stdout(predicate::str::contains("```ts"))
            .stdout(predicate::str::contains("entry file"));
    }

    #[test]
    fn strict_ambiguous_symbol_exits_2_with_definitions() {
        let dir = fixture();
        repo_slice(&dir)
            .args([
                "pack",
                "--symbol",
                "renderHelp",
                "--symbol-strict",
                "--no-timestamp",
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("src/commands/help.ts"))
            .stderr(predicate::str::contains("src/commands/pack.ts"));
    }

    #[test]
    fn unresolved_everything_exits_2() {
        let dir = fixture();
        repo_slice(&dir)
            .args(["pack", "--symbol", "noSuchSymbolAnywhere", "--no-timestamp"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("no definitions found"));
    }

    #[test]
    fn log_anchor_pads_three_lines() {
        let dir = fixture();
        let log_path = dir.path().join("build.log");
        std::fs::write(&log_path, "src/cli.ts:10:5 - error TS2345: nope\n").expect("write log");
        let output = repo_slice(&dir)
            .args([
                "pack",
                "--from-log",
                log_path.to_str().expect("utf8"),
                "--no-timestamp",
                "--format",
                "json",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let parsed: serde_json::Value = serde_json::from_slice(&output).expect("bundle json");
        let item = parsed["items"]
            .as_array()
            .expect("items")
            .iter()
            .find(|i| i["range"].is_object())
            .expect("snippet item");
        assert_eq!(item["range"]["startLine"], 7);
        assert_eq!(item["range"]["endLine"], 13);
    }

    #[test]
    fn python_symbol_resolves_through_module_map() {
        let dir = fixture();
        let output = repo_slice(&dir)
            .args([
                "pack",
                "--symbol",
                "tools.report.summarize",
                "--no-timestamp",
                "--format",
                "json",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let parsed: serde_json::Value = serde_json::from_slice(&output).expect("bundle json");
        let paths: Vec<&str> = parsed["items"]
            .as_array()
            .expect("items")
            .iter()
            .map(|i| i["filePath"].as_str().expect("filePath"))
            .collect();
        assert!(paths.contains(&"src/tools/report.py"));
    }

    #[test]
    fn redact_masks_secret_lines() {
        let dir = fixture();
        std::fs::write(
            dir.path().join("src/secrets.ts"),
            "export const API_KEY = 'sk-123';\nexport const plain = 1;\n",
        )
        .expect("write");
        repo_slice(&dir)
            .args([
                "pack",
                "--entry",
                "src/secrets.ts",
                "--redact",
                "--no-timestamp",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("<redacted>"))
            .stdout(predicate::str::contains("sk-123").not());
    }

    #[test]
    fn out_flag_writes_file() {
        let dir = fixture();
        repo_slice(&dir)
            .args([
                "pack",
                "--entry",
                "src/cli.ts",
                "--no-timestamp",
                "--format",
                "json",
                "--out",
                "bundle.json",
            ])
            .assert()
            .success();
        let written = std::fs::read_to_string(dir.path().join("bundle.json")).expect("out file");
        assert!(written.contains("src/cli.ts"));
    }
}

mod graph_cmd {
    use super::*;

    #[test]
    fn imports_graph_json_nodes_and_edges() {
        let dir = fixture();
        let output = repo_slice(&dir)
            .args([
                "graph",
                "--entry",
                "src/cli.ts",
                "--no-timestamp",
                "--format",
                "json",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let parsed: serde_json::Value = serde_json::from_slice(&output).expect("graph json");
        assert_eq!(parsed["meta"]["graphType"], "imports");
        let ids: Vec<&str> = parsed["nodes"]
            .as_array()
            .expect("nodes")
            .iter()
            .map(|n| n["id"].as_str().expect("id"))
            .collect();
        assert!(ids.contains(&"ts:src/cli.ts"));
        assert!(ids.contains(&"ts:src/commands/pack.ts"));
        // Nodes sorted by id ascending.
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn dot_output_styles_anchors() {
        let dir = fixture();
        repo_slice(&dir)
            .args([
                "graph",
                "--entry",
                "src/cli.ts",
                "--no-timestamp",
                "--format",
                "dot",
            ])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("digraph G {"))
            .stdout(predicate::str::contains("rankdir=LR;"))
            .stdout(predicate::str::contains("fillcolor=lightblue"));
    }

    #[test]
    fn truncation_reports_counts_and_keeps_anchor() {
        let dir = fixture();
        let output = repo_slice(&dir)
            .args([
                "graph",
                "--entry",
                "src/cli.ts",
                "--max-nodes",
                "1",
                "--no-timestamp",
                "--format",
                "json",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let parsed: serde_json::Value = serde_json::from_slice(&output).expect("graph json");
        assert_eq!(parsed["meta"]["truncated"], true);
        let nodes = parsed["nodes"].as_array().expect("nodes");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0]["id"], "ts:src/cli.ts");
        assert_eq!(nodes[0]["anchor"], true);
    }

    #[test]
    fn calls_graph_links_known_callees() {
        let dir = fixture();
        let output = repo_slice(&dir)
            .args([
                "graph",
                "--entry",
                "src/cli.ts",
                "--graph-type",
                "calls",
                "--no-timestamp",
                "--format",
                "json",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let parsed: serde_json::Value = serde_json::from_slice(&output).expect("graph json");
        let edges = parsed["edges"].as_array().expect("edges");
        assert!(
            edges
                .iter()
                .any(|e| e["to"] == "ts:src/commands/pack.ts#pack" && e["type"] == "calls")
        );
    }
}

mod diff_anchors {
    use super::*;
    use std::process::Command as StdCommand;

    fn git(dir: &Path, args: &[&str]) -> bool {
        StdCommand::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn from_diff_anchors_changed_lines() {
        let dir = fixture();
        if !git(dir.path(), &["init", "-q"]) {
            // No usable git on this machine; the diff parser is covered by
            // unit tests.
            return;
        }
        git(dir.path(), &["config", "user.email", "t@example.com"]);
        git(dir.path(), &["config", "user.name", "t"]);
        git(dir.path(), &["add", "."]);
        if !git(dir.path(), &["commit", "-q", "-m", "base"]) {
            return;
        }
        let cli = dir.path().join("src/cli.ts");
        let mut content = std::fs::read_to_string(&cli).expect("read");
        content.push_str("export const added = 1;\n");
        std::fs::write(&cli, content).expect("write");

        let output = repo_slice(&dir)
            .args([
                "pack",
                "--from-diff",
                "HEAD",
                "--no-timestamp",
                "--format",
                "json",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let parsed: serde_json::Value = serde_json::from_slice(&output).expect("bundle json");
        let items = parsed["items"].as_array().expect("items");
        assert!(
            items
                .iter()
                .any(|i| i["filePath"] == "src/cli.ts"
                    && i["reasons"]
                        .as_array()
                        .expect("reasons")
                        .iter()
                        .any(|r| r == "diff hunk"))
        );
    }
}
