//! Line-wise secret redaction for bundle contents.

use regex::RegexBuilder;

/// Compiled redaction patterns, matched case-insensitively per line.
pub struct Redactor {
    patterns: Vec<regex::Regex>,
}

impl Redactor {
    pub fn new(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| {
                RegexBuilder::new(&regex::escape(p))
                    .case_insensitive(true)
                    .build()
                    .ok()
            })
            .collect();
        Self { patterns }
    }

    /// Replace each matching line with `<redacted>`, keeping indentation so
    /// snippet line counts and shape survive.
    pub fn apply(&self, content: &str) -> String {
        if self.patterns.is_empty() {
            return content.to_string();
        }
        let mut out = String::with_capacity(content.len());
        for line in content.lines() {
            if self.patterns.iter().any(|p| p.is_match(line)) {
                let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
                out.push_str(&indent);
                out.push_str("<redacted>");
            } else {
                out.push_str(line);
            }
            out.push('\n');
        }
        out
    }
}
