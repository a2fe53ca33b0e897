//! Section-aware chunking of oversized documents for the AI parser.
//!
//! Chunks break at headings where possible, so a module rarely straddles two
//! requests. Sections larger than the chunk budget are force-split on
//! paragraph, line and sentence boundaries, in that order of preference.

use regex::Regex;
use std::sync::LazyLock;

use super::text::{LineContext, classify_line};

pub const DEFAULT_MIN_CHUNK_CHARS: usize = 4_000;
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 20_000;

static CAPITALIZED_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{Lu}[^.!?;,]{2,70}$").unwrap());

/// Splits text into chunks of `min_chars..=max_chars` characters (the last
/// chunk may be shorter).
#[derive(Debug, Clone)]
pub struct SectionChunker {
    pub min_chars: usize,
    pub max_chars: usize,
    separators: Vec<&'static str>,
}

impl Default for SectionChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CHUNK_CHARS, DEFAULT_MAX_CHUNK_CHARS)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

impl SectionChunker {
    pub fn new(min_chars: usize, max_chars: usize) -> Self {
        let max_chars = max_chars.max(1);
        Self {
            min_chars: min_chars.min(max_chars),
            max_chars,
            // Separators in order of preference (most to least specific)
            separators: vec!["\n\n", "\n", ". ", "! ", "? ", "; ", " "],
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return vec![];
        }
        if char_len(text) <= self.max_chars {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        for section in sections(text) {
            let pieces = if char_len(&section) > self.max_chars {
                self.force_split(&section, 0)
            } else {
                vec![section]
            };
            for piece in pieces {
                let joined = char_len(&current) + char_len(&piece) + 2;
                if !current.is_empty() && joined > self.max_chars {
                    chunks.push(std::mem::take(&mut current));
                }
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
                current.push_str(&piece);
                // Full enough: close at this section boundary.
                if char_len(&current) >= self.min_chars && char_len(&current) > self.max_chars / 2 {
                    chunks.push(std::mem::take(&mut current));
                }
            }
        }
        if !current.trim().is_empty() {
            chunks.push(current);
        }
        chunks.into_iter().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect()
    }

    fn force_split(&self, text: &str, separator_idx: usize) -> Vec<String> {
        let Some(&separator) = self.separators.get(separator_idx) else {
            return self.split_by_chars(text);
        };
        let splits: Vec<&str> = text.split(separator).collect();

        let mut chunks = Vec::new();
        let mut current = String::new();
        for (i, split) in splits.iter().enumerate() {
            let split_with_sep = if i < splits.len() - 1 {
                format!("{}{}", split, separator)
            } else {
                split.to_string()
            };
            if char_len(&current) + char_len(&split_with_sep) > self.max_chars && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current.push_str(&split_with_sep);
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
            .into_iter()
            .flat_map(|chunk| {
                if char_len(&chunk) > self.max_chars {
                    self.force_split(&chunk, separator_idx + 1)
                } else {
                    vec![chunk]
                }
            })
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }

    fn split_by_chars(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.max_chars)
            .map(|chunk| chunk.iter().collect::<String>())
            .collect()
    }
}

/// Split at heading lines: Markdown headers, keyword and numbered headings,
/// and short capitalized lines standing alone between blank lines.
fn sections(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for (idx, &line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        let prev_blank = idx == 0 || lines[idx - 1].trim().is_empty();
        let next = lines.get(idx + 1).copied();
        let ctx = LineContext {
            line: trimmed,
            prev_blank,
            next,
        };
        let standalone_title = prev_blank
            && next.is_none_or(|n| n.trim().is_empty() || !CAPITALIZED_TITLE.is_match(n.trim()))
            && CAPITALIZED_TITLE.is_match(trimmed);
        let boundary = !trimmed.is_empty() && (classify_line(&ctx).is_some() || standalone_title);
        if boundary && current.iter().any(|l| !l.trim().is_empty()) {
            sections.push(current.join("\n"));
            current.clear();
        }
        current.push(line);
    }
    if current.iter().any(|l| !l.trim().is_empty()) {
        sections.push(current.join("\n"));
    }
    sections
}
