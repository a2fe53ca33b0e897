//! XML parser: the element tree is folded into a JSON value and handed to the
//! same normalizer as JSON input, so tags and attributes accept every alias
//! the JSON keys do.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::aliases::Field;
use super::normalize::Normalizer;
use super::text;
use crate::model::{ParseMethod, ParseResult};

/// Tags whose children form a list regardless of their names.
const COLLECTION_FIELDS: [Field; 9] = [
    Field::Trails,
    Field::Modules,
    Field::Questions,
    Field::Options,
    Field::Items,
    Field::LeftItems,
    Field::RightItems,
    Field::CorrectPairs,
    Field::CorrectOrder,
];

fn is_collection(tag: &str) -> bool {
    let tag = tag.to_lowercase();
    COLLECTION_FIELDS
        .iter()
        .any(|field| field.aliases().iter().any(|alias| alias.to_lowercase() == tag))
}

/// Repeated item tags (`<module>` directly under `<trail>`) are gathered
/// under their plural key. `always` items are gathered even when they hold
/// only text.
fn plural_key(tag: &str) -> Option<(&'static str, bool)> {
    let key = match tag.to_lowercase().as_str() {
        "trail" | "course" | "курс" | "трейл" => ("trails", false),
        "module" | "lesson" | "модуль" | "урок" | "занятие" => ("modules", false),
        "question" | "вопрос" => ("questions", false),
        "option" | "choice" | "variant" | "вариант" => ("options", true),
        "item" | "step" | "шаг" => ("items", true),
        _ => return None,
    };
    Some(key)
}

fn own_text(node: roxmltree::Node) -> String {
    node.children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn element_to_value(node: roxmltree::Node) -> Value {
    let tag = node.tag_name().name();
    let children: Vec<roxmltree::Node> = node.children().filter(|c| c.is_element()).collect();
    let has_attributes = node.attributes().next().is_some();

    if children.is_empty() && !has_attributes {
        return Value::String(own_text(node));
    }
    if is_collection(tag) && !has_attributes {
        return Value::Array(children.into_iter().map(element_to_value).collect());
    }

    let mut map = Map::new();
    for attr in node.attributes() {
        map.insert(attr.name().to_string(), Value::String(attr.value().to_string()));
    }
    let text = own_text(node);
    if !text.is_empty() {
        map.entry("text").or_insert(Value::String(text));
    }

    for child in children {
        let name = child.tag_name().name();
        let complex = child.children().any(|c| c.is_element()) || child.attributes().next().is_some();
        let value = element_to_value(child);
        match plural_key(name) {
            Some((plural, always)) if always || complex => {
                let slot = map.entry(plural).or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = slot {
                    items.push(value);
                }
            }
            _ => match map.get_mut(name) {
                Some(Value::Array(items)) if !is_collection(name) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(name.to_string(), value);
                }
            },
        }
    }
    Value::Object(map)
}

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

pub fn parse(content: &str) -> ParseResult {
    let mut warnings = Vec::new();
    let document = match roxmltree::Document::parse(content.trim_start_matches('\u{feff}')) {
        Ok(document) => document,
        Err(err) => {
            // Malformed XML: keep the text, lose the tags.
            let stripped = TAG.replace_all(content, "\n");
            let mut result = text::parse_heuristic(&stripped);
            result.warnings.insert(0, format!("Malformed XML ({}); parsed its text content", err));
            return result;
        }
    };

    let root = element_to_value(document.root_element());
    // A bare root such as `<trail>` carries the trail fields itself.
    let value = match (&root, plural_key(document.root_element().tag_name().name())) {
        (Value::Object(_), Some(("modules", _))) => {
            let mut wrapper = Map::new();
            wrapper.insert("modules".into(), Value::Array(vec![root.clone()]));
            Value::Object(wrapper)
        }
        _ => root,
    };

    let trails = Normalizer::DOCUMENT.trails(&value, &mut warnings);
    if trails.is_empty() {
        let text: Vec<&str> = document
            .descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        let mut result = text::parse_heuristic(&text.join("\n"));
        result
            .warnings
            .insert(0, "No trail or module elements found; parsed the XML text content".into());
        return result;
    }
    ParseResult::from_trails(trails, warnings, ParseMethod::Code)
}
