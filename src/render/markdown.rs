//! Markdown bundle rendering: a preamble of `- key: value` lines, an index,
//! per-item fenced code blocks tagged by file extension, and an omitted list.

use crate::paths::{extension, to_repo_relative};

use super::BundleRenderInput;

/// Fence tag for a file path; unknown extensions fall back to text.
fn fence_tag(path: &str) -> &'static str {
    match extension(path).as_str() {
        "ts" | "tsx" => "ts",
        "js" | "jsx" | "mjs" | "cjs" => "js",
        "py" => "python",
        "json" => "json",
        "toml" => "toml",
        "md" => "md",
        _ => "text",
    }
}

fn item_label(input: &BundleRenderInput, candidate: &crate::types::Candidate) -> String {
    let rel = to_repo_relative(&candidate.file_path, input.repo_root);
    match candidate.range {
        Some(range) => format!("{}:{}-{}", rel, range.start_line, range.end_line),
        None => rel,
    }
}

pub fn render_bundle_markdown(input: &BundleRenderInput) -> String {
    let selection = input.selection;
    let mut out = String::new();
    out.push_str("# repo-slice bundle\n\n");

    if let Some(ts) = &input.timestamp {
        out.push_str(&format!("- generatedAt: {}\n", ts));
    }
    out.push_str(&format!(
        "- workspaces: {}\n",
        input
            .workspaces
            .iter()
            .map(|w| w.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    out.push_str(&format!("- budgetChars: {}\n", input.budget_chars));
    out.push_str(&format!("- usedChars: {}\n", selection.used_chars));
    if let Some(bt) = input.budget_tokens {
        out.push_str(&format!("- budgetTokens: {}\n", bt));
    }
    if let Some(ut) = selection.used_tokens {
        out.push_str(&format!("- usedTokens: {}\n", ut));
    }
    out.push_str(&format!("- items: {}\n", selection.items.len()));
    out.push_str(&format!("- omitted: {}\n", selection.omitted.len()));
    if !input.resolution.unresolved_symbols.is_empty() {
        out.push_str(&format!(
            "- unresolvedSymbols: {}\n",
            input.resolution.unresolved_symbols.join(", ")
        ));
    }
    out.push('\n');

    out.push_str("## Index\n\n");
    for item in &selection.items {
        let label = item_label(input, &item.candidate);
        if input.show_reasons {
            out.push_str(&format!(
                "- {} ({})\n",
                label,
                item.candidate.reasons.join(", ")
            ));
        } else {
            out.push_str(&format!("- {}\n", label));
        }
    }
    out.push('\n');

    for item in &selection.items {
        out.push_str(&format!("## {}\n\n", item_label(input, &item.candidate)));
        out.push_str(&format!("```{}\n", fence_tag(&item.candidate.file_path)));
        out.push_str(&item.content);
        if !item.content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n\n");
    }

    if !selection.omitted.is_empty() {
        out.push_str("## Omitted\n\n");
        for entry in &selection.omitted {
            out.push_str(&format!(
                "- {} ({})\n",
                item_label(input, &entry.candidate),
                entry.reason
            ));
        }
    }

    out
}
