//! Recovery of JSON from model output.
//!
//! Model responses may be fenced, wrapped in prose, cut off mid-stream or
//! subtly malformed. [`recover_json`] runs the [`RECOVERY_STRATEGIES`] in
//! order and reports which tier produced the value, so callers can warn when
//! the result came from a degraded path.

use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTier {
    /// The response parsed as is (after fence stripping).
    Direct,
    /// Truncated or malformed JSON was cut back and closed.
    Repaired,
    /// Only the completely received trail objects were kept.
    PartialExtraction,
    /// Damaged trails were reduced to their completely received modules.
    CompletedTrailRecovery,
}

impl RecoveryTier {
    pub fn name(self) -> &'static str {
        match self {
            RecoveryTier::Direct => "direct",
            RecoveryTier::Repaired => "repaired",
            RecoveryTier::PartialExtraction => "partial-extraction",
            RecoveryTier::CompletedTrailRecovery => "completed-trail-recovery",
        }
    }

    /// Warning attached to results produced by this tier.
    pub fn warning(self) -> Option<&'static str> {
        match self {
            RecoveryTier::Direct => None,
            RecoveryTier::Repaired => {
                Some("AI response was malformed or truncated; the JSON was repaired before parsing")
            }
            RecoveryTier::PartialExtraction => {
                Some("AI response was truncated; only completely received trails were kept")
            }
            RecoveryTier::CompletedTrailRecovery => {
                Some("AI response was damaged; only completely received modules were kept")
            }
        }
    }
}

impl fmt::Display for RecoveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

type Attempt = fn(&str) -> Option<Value>;

/// Strategies in the order they are tried; the first success wins.
pub const RECOVERY_STRATEGIES: [(RecoveryTier, Attempt); 4] = [
    (RecoveryTier::Direct, parse_direct),
    (RecoveryTier::Repaired, parse_repaired),
    (RecoveryTier::PartialExtraction, extract_complete_items),
    (RecoveryTier::CompletedTrailRecovery, recover_completed_modules),
];

/// Candidate cut points tried by [`repair_json`] before giving up.
const MAX_REPAIR_ATTEMPTS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Value,
    pub tier: RecoveryTier,
}

/// Extract a JSON value from a model response; `None` when every tier fails.
pub fn recover_json(response: &str) -> Option<Recovered> {
    let cleaned = strip_code_fences(response);
    RECOVERY_STRATEGIES.iter().find_map(|(tier, attempt)| {
        attempt(cleaned).map(|value| Recovered { value, tier: *tier })
    })
}

/// Strip a Markdown code fence opened before the JSON. An unclosed fence
/// (truncated output) is stripped too.
fn strip_code_fences(s: &str) -> &str {
    let s = s.trim();
    let Some(open) = s.find("```") else {
        return s;
    };
    if s.find('{').is_some_and(|brace| brace < open) {
        return s;
    }
    let after = &s[open + 3..];
    let Some(newline) = after.find('\n') else {
        return s;
    };
    let inner = &after[newline + 1..];
    // A fence inside a JSON string is preceded by an escaped `\n`, never a
    // raw newline.
    match inner.rfind("\n```") {
        Some(close) if inner[..close].trim_end().ends_with(['}', ']']) => inner[..close].trim(),
        _ if inner.trim_start().starts_with("```") => "",
        _ => inner.trim(),
    }
}

/// Characters outside string literals, with their byte offsets.
struct Structural<'a> {
    chars: std::str::CharIndices<'a>,
    in_string: bool,
    escaped: bool,
}

impl<'a> Structural<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices(),
            in_string: false,
            escaped: false,
        }
    }
}

impl Iterator for Structural<'_> {
    type Item = (usize, char);

    fn next(&mut self) -> Option<(usize, char)> {
        for (i, c) in self.chars.by_ref() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }
            if c == '"' {
                self.in_string = true;
                continue;
            }
            return Some((i, c));
        }
        None
    }
}

/// Byte offset of the bracket closing the one `text` starts with.
fn matching_close(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in Structural::new(text) {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ if depth == 0 => return None,
            _ => {}
        }
    }
    None
}

fn parse_direct(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let candidate = &text[start..];
    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Some(value);
    }
    // Trailing prose after the object.
    let end = matching_close(candidate)?;
    serde_json::from_str(&candidate[..=end]).ok()
}

fn parse_repaired(text: &str) -> Option<Value> {
    repair_json(text).and_then(|repaired| serde_json::from_str(&repaired).ok())
}

/// Cut damaged JSON back to a structurally complete prefix and close it.
///
/// Candidates are tried in order: the whole text closed as is, then cuts just
/// after each closing `}`/`]` (latest first), then cuts before each comma.
/// Trailing commas are dropped. The result always parses, and any `trails`
/// it holds have a title and a module list; `None` when no candidate does.
pub fn repair_json(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let text = &text[start..];

    let mut stack: Vec<char> = Vec::new();
    let mut closing_cuts: Vec<(usize, String)> = Vec::new();
    let mut comma_cuts: Vec<(usize, String)> = Vec::new();
    let mut whole: Option<(usize, String)> = None;

    let mut scan = Structural::new(text);
    for (i, c) in scan.by_ref() {
        match c {
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() != Some(&c) {
                    // Mismatched bracket: nothing after it can be trusted.
                    whole = Some((i, closers(&stack)));
                    break;
                }
                stack.pop();
                if stack.is_empty() {
                    whole = Some((i + 1, String::new()));
                    break;
                }
                closing_cuts.push((i + 1, closers(&stack)));
            }
            ',' => comma_cuts.push((i, closers(&stack))),
            _ => {}
        }
    }
    if whole.is_none() && !scan.in_string {
        whole = Some((text.len(), closers(&stack)));
    }

    let candidates = whole
        .into_iter()
        .chain(closing_cuts.into_iter().rev())
        .chain(comma_cuts.into_iter().rev())
        .take(MAX_REPAIR_ATTEMPTS);
    for (cut, suffix) in candidates {
        let prefix = text[..cut].trim_end().trim_end_matches(':');
        let candidate = remove_trailing_commas(&format!("{}{}", prefix, suffix));
        if let Ok(value) = serde_json::from_str::<Value>(&candidate)
            && trails_are_well_formed(&value)
        {
            return Some(candidate);
        }
    }
    None
}

fn closers(stack: &[char]) -> String {
    stack.iter().rev().collect()
}

/// Drop commas followed only by whitespace and a closing bracket.
fn remove_trailing_commas(text: &str) -> String {
    let structural: Vec<(usize, char)> = Structural::new(text).collect();
    let mut drop = Vec::new();
    for pair in structural.windows(2) {
        let ((i, c), (j, next)) = (pair[0], pair[1]);
        if c == ',' && matches!(next, '}' | ']') && text[i + 1..j].trim().is_empty() {
            drop.push(i);
        }
    }
    if let Some(&(i, ',')) = structural.last() {
        drop.push(i);
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for i in drop {
        out.push_str(&text[last..i]);
        last = i + 1;
    }
    out.push_str(&text[last..]);
    out
}

fn trails_are_well_formed(value: &Value) -> bool {
    let Some(trails) = value.get("trails") else {
        return true;
    };
    let Some(trails) = trails.as_array() else {
        return false;
    };
    trails.iter().all(|trail| {
        trail.get("title").is_some_and(Value::is_string)
            && trail.get("modules").and_then(Value::as_array).is_some_and(|modules| {
                modules
                    .iter()
                    .all(|m| m.get("title").is_some_and(Value::is_string))
            })
    })
}

/// Object elements of the array under `key`; the last one may be incomplete.
struct ArrayItems<'a> {
    complete: Vec<&'a str>,
    incomplete: Option<&'a str>,
}

fn array_items<'a>(text: &'a str, key: &str) -> Option<ArrayItems<'a>> {
    let pattern = format!("\"{}\"", key);
    let body = text.match_indices(&pattern).find_map(|(at, _)| {
        text[at + pattern.len()..]
            .trim_start()
            .strip_prefix(':')?
            .trim_start()
            .strip_prefix('[')
    })?;

    let mut items = ArrayItems {
        complete: Vec::new(),
        incomplete: None,
    };
    let mut rest = body;
    loop {
        rest = rest.trim_start().trim_start_matches(',').trim_start();
        if !rest.starts_with('{') {
            break;
        }
        match matching_close(rest) {
            Some(end) => {
                items.complete.push(&rest[..=end]);
                rest = &rest[end + 1..];
            }
            None => {
                items.incomplete = Some(rest);
                break;
            }
        }
    }
    Some(items)
}

/// Completely received `trails` (or, for chunk responses, `modules`).
fn extract_complete_items(text: &str) -> Option<Value> {
    let key = if text.contains("\"trails\"") { "trails" } else { "modules" };
    let items = array_items(text, key)?;
    let parsed: Vec<Value> = items
        .complete
        .iter()
        .filter_map(|item| serde_json::from_str::<Value>(item).ok())
        .filter(|item| key != "trails" || trails_are_well_formed(&serde_json::json!({ "trails": [item] })))
        .collect();
    if parsed.is_empty() {
        return None;
    }
    let mut out = Map::new();
    out.insert(key.to_string(), Value::Array(parsed));
    Some(Value::Object(out))
}

/// Like [`extract_complete_items`], but a trail that does not parse keeps
/// its header fields and its completely received modules.
fn recover_completed_modules(text: &str) -> Option<Value> {
    if let Some(items) = array_items(text, "trails") {
        let trails: Vec<Value> = items
            .complete
            .iter()
            .map(|item| {
                serde_json::from_str::<Value>(item)
                    .ok()
                    .filter(|v| v.is_object())
                    .or_else(|| salvage_trail(item))
            })
            .chain(items.incomplete.map(salvage_trail))
            .flatten()
            .collect();
        if !trails.is_empty() {
            let mut out = Map::new();
            out.insert("trails".into(), Value::Array(trails));
            return Some(Value::Object(out));
        }
    }
    salvage_trail(text)
}

fn salvage_trail(text: &str) -> Option<Value> {
    let items = array_items(text, "modules")?;
    let modules: Vec<Value> = items
        .complete
        .iter()
        .filter_map(|item| serde_json::from_str::<Value>(item).ok())
        .filter(|m| m.get("title").is_some())
        .collect();
    if modules.is_empty() {
        return None;
    }
    let mut trail = header_fields(text).unwrap_or_default();
    trail.insert("modules".into(), Value::Array(modules));
    Some(Value::Object(trail))
}

/// Scalar fields written before the `modules` key.
fn header_fields(text: &str) -> Option<Map<String, Value>> {
    let cut = text.find("\"modules\"")?;
    let head = text[..cut].trim_end().trim_end_matches(',');
    serde_json::from_str(&format!("{}}}", head)).ok()
}
