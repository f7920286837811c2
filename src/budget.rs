//! Budget-bounded selection.
//!
//! Reads candidate contents in bounded-concurrency batches, then fills the
//! character (and optional token) budget in rank order. Anchors are taken
//! first so they are never displaced by expansion candidates; a header
//! snippet stands in for anchor files too large for half the budget.

use crate::redact::Redactor;
use crate::types::{Candidate, CandidateKind, Range};

/// Content read batch width.
const READ_BATCH: usize = 10;

/// Lines kept by the header-snippet fallback.
const HEADER_SNIPPET_LINES: usize = 80;

pub struct BundleItem {
    pub candidate: Candidate,
    pub content: String,
}

pub struct OmittedItem {
    pub candidate: Candidate,
    pub reason: String,
}

pub struct SelectionResult {
    pub items: Vec<BundleItem>,
    pub omitted: Vec<OmittedItem>,
    pub used_chars: usize,
    pub used_tokens: Option<usize>,
}

/// Select candidates under the budgets. `candidates` must already be ranked.
pub fn select(
    mut candidates: Vec<Candidate>,
    budget_chars: usize,
    budget_tokens: Option<usize>,
    redactor: Option<&Redactor>,
) -> SelectionResult {
    add_header_snippets(&mut candidates, budget_chars);
    crate::expand::rank(&mut candidates);

    // Anchors first, each group keeping rank order.
    let (anchors, rest): (Vec<Candidate>, Vec<Candidate>) =
        candidates.into_iter().partition(|c| c.anchor);
    let ordered: Vec<Candidate> = anchors.into_iter().chain(rest).collect();

    let contents = read_contents(&ordered, redactor);

    let mut items = Vec::new();
    let mut omitted = Vec::new();
    let mut used_chars = 0usize;
    let mut used_tokens = 0usize;

    for (candidate, content) in ordered.into_iter().zip(contents) {
        let reasons = candidate.reasons.join(", ");
        let content = match content {
            Ok(content) => content,
            Err(_) => {
                omitted.push(OmittedItem {
                    candidate,
                    reason: format!("{}; failed to read file", reasons),
                });
                continue;
            }
        };
        let length = content.chars().count();
        let tokens = length.div_ceil(4);
        let over_chars = used_chars + length > budget_chars;
        let over_tokens = budget_tokens.is_some_and(|bt| used_tokens + tokens > bt);
        if over_chars || over_tokens {
            omitted.push(OmittedItem {
                candidate,
                reason: reasons,
            });
            continue;
        }
        used_chars += length;
        used_tokens += tokens;
        items.push(BundleItem { candidate, content });
    }

    SelectionResult {
        items,
        omitted,
        used_chars,
        used_tokens: budget_tokens.map(|_| used_tokens),
    }
}

/// For any anchor file candidate whose estimated size exceeds half the
/// budget, add a `header snippet` candidate for lines 1..80 at
/// `score - 200` so the declaration surface survives budget pressure.
fn add_header_snippets(candidates: &mut Vec<Candidate>, budget_chars: usize) {
    let half = budget_chars / 2;
    let mut extra = Vec::new();
    for candidate in candidates.iter() {
        if !candidate.anchor
            || candidate.kind != CandidateKind::File
            || candidate.estimated_chars <= half
        {
            continue;
        }
        let range = Range::lines(1, HEADER_SNIPPET_LINES);
        let id = Candidate::snippet_id(&candidate.file_path, range);
        if candidates.iter().any(|c| c.id == id) {
            continue;
        }
        extra.push(Candidate {
            id,
            kind: CandidateKind::Snippet,
            language: candidate.language,
            workspace: candidate.workspace.clone(),
            file_path: candidate.file_path.clone(),
            range: Some(range),
            score: candidate.score - 200,
            reasons: vec!["header snippet".to_string()],
            estimated_chars: HEADER_SNIPPET_LINES * 80,
            anchor: false,
        });
    }
    candidates.extend(extra);
}

/// Read all candidate contents in parallel batches of up to 10, keeping
/// input order.
fn read_contents(
    candidates: &[Candidate],
    redactor: Option<&Redactor>,
) -> Vec<std::io::Result<String>> {
    let mut out: Vec<std::io::Result<String>> = Vec::with_capacity(candidates.len());
    for _ in candidates {
        out.push(Err(std::io::Error::other("unread")));
    }
    for (chunk_idx, chunk) in candidates.chunks(READ_BATCH).enumerate() {
        let base = chunk_idx * READ_BATCH;
        let results: Vec<(usize, std::io::Result<String>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .enumerate()
                .map(|(offset, candidate)| {
                    scope.spawn(move || (base + offset, read_candidate(candidate)))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("read thread panicked"))
                .collect()
        });
        for (idx, result) in results {
            out[idx] = result;
        }
    }
    if let Some(redactor) = redactor {
        for entry in &mut out {
            if let Ok(content) = entry {
                *content = redactor.apply(content);
            }
        }
    }
    out
}

fn read_candidate(candidate: &Candidate) -> std::io::Result<String> {
    let content = std::fs::read_to_string(&candidate.file_path)?;
    match candidate.range {
        None => Ok(content),
        Some(range) => {
            let mut out = String::new();
            for (idx, line) in content.lines().enumerate() {
                let line_no = idx + 1;
                if line_no < range.start_line {
                    continue;
                }
                if line_no > range.end_line {
                    break;
                }
                out.push_str(line);
                out.push('\n');
            }
            Ok(out)
        }
    }
}
