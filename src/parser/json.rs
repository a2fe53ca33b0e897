use serde_json::Value;

use super::normalize::Normalizer;
use super::text;
use crate::model::{ParseMethod, ParseResult};

/// Parse a JSON course document. Unknown shapes and invalid JSON degrade to
/// the text heuristics over the document's string values.
pub fn parse(content: &str) -> ParseResult {
    let value: Value = match serde_json::from_str(content.trim_start_matches('\u{feff}')) {
        Ok(value) => value,
        Err(err) => {
            let mut result = text::parse(content);
            result.warnings.insert(0, format!("Invalid JSON ({}); parsed as plain text", err));
            return result;
        }
    };

    let mut warnings = Vec::new();
    let trails = Normalizer::DOCUMENT.trails(&value, &mut warnings);
    if !trails.is_empty() {
        return ParseResult::from_trails(trails, warnings, ParseMethod::Code);
    }

    let mut strings = Vec::new();
    collect_strings(&value, &mut strings);
    let mut result = text::parse_heuristic(&strings.join("\n\n"));
    result
        .warnings
        .insert(0, "No trails or modules found in JSON; parsed its text values".into());
    result
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}
