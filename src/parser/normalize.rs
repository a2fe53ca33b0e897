//! Loosely typed JSON values -> normalized trails.
//!
//! Shared by the JSON parser and the AI parser: both receive documents whose
//! keys follow no fixed schema. Field names are resolved through the alias
//! table, scalars through the validators.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::aliases::{Field, first_alias, first_array, first_str, truthy};
use super::common::{self, dedupe_module_slugs, slugify};
use super::validate;
use crate::model::{
    CaseAnalysisData, CaseOption, LabeledItem, MatchingData, ModuleType, OrderingData, ParsedModule,
    ParsedQuestion, ParsedTrail, QuestionData, QuestionType,
};

pub const SYNTHETIC_TRAIL_TITLE: &str = "Imported Course";

/// How much free-text inference to apply on top of the explicit structure.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    /// Scan module content for embedded quiz blocks when no questions array
    /// was supplied.
    pub extract_embedded_questions: bool,
}

impl Normalizer {
    /// For user documents.
    pub const DOCUMENT: Normalizer = Normalizer {
        extract_embedded_questions: true,
    };
    /// For model output, whose content is prose we asked for.
    pub const MODEL: Normalizer = Normalizer {
        extract_embedded_questions: false,
    };

    /// Cascade: `trails` array, then a single trail object, then orphan
    /// modules wrapped in a synthetic trail. Empty when nothing matched.
    pub fn trails(&self, value: &Value, warnings: &mut Vec<String>) -> Vec<ParsedTrail> {
        match value {
            Value::Object(obj) => {
                if let Some(trails) = first_array(obj, Field::Trails) {
                    return self.trail_list(trails, warnings);
                }
                if let Some(modules) = first_array(obj, Field::Modules) {
                    let trail = if first_str(obj, Field::Title).is_some() {
                        self.trail(obj, 0, warnings)
                    } else {
                        warnings.push("Modules found without a trail; wrapped in a synthetic trail".into());
                        self.synthetic_trail(modules, warnings)
                    };
                    return trail.into_iter().collect();
                }
                // A lone module object.
                if first_str(obj, Field::Title).is_some()
                    && (first_alias(obj, Field::Content).is_some() || first_array(obj, Field::Questions).is_some())
                {
                    warnings.push("Single module found without a trail; wrapped in a synthetic trail".into());
                    return self
                        .synthetic_trail(std::slice::from_ref(value), warnings)
                        .into_iter()
                        .collect();
                }
                Vec::new()
            }
            Value::Array(items) => {
                let trail_like = items
                    .iter()
                    .filter_map(Value::as_object)
                    .any(|o| first_array(o, Field::Modules).is_some());
                if trail_like {
                    self.trail_list(items, warnings)
                } else if items.iter().any(Value::is_object) {
                    warnings.push("Top-level array treated as a module list".into());
                    self.synthetic_trail(items, warnings).into_iter().collect()
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    fn trail_list(&self, items: &[Value], warnings: &mut Vec<String>) -> Vec<ParsedTrail> {
        items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| match item.as_object() {
                Some(obj) => self.trail(obj, idx, warnings),
                None => {
                    warnings.push(format!("Skipped trail #{}: not an object", idx + 1));
                    None
                }
            })
            .collect()
    }

    fn synthetic_trail(&self, modules: &[Value], warnings: &mut Vec<String>) -> Option<ParsedTrail> {
        let mut trail = ParsedTrail::new(SYNTHETIC_TRAIL_TITLE);
        trail.modules = self.modules(modules, warnings);
        if trail.modules.is_empty() {
            return None;
        }
        dedupe_module_slugs(&mut trail);
        Some(trail)
    }

    pub fn trail(&self, obj: &Map<String, Value>, index: usize, warnings: &mut Vec<String>) -> Option<ParsedTrail> {
        let title = first_str(obj, Field::Title).unwrap_or_else(|| {
            warnings.push(format!("Trail #{} has no title", index + 1));
            if index == 0 {
                SYNTHETIC_TRAIL_TITLE.to_string()
            } else {
                format!("{} {}", SYNTHETIC_TRAIL_TITLE, index + 1)
            }
        });
        let mut trail = ParsedTrail::new(title);
        if let Some(slug) = first_str(obj, Field::Slug) {
            trail.slug = slugify(&slug);
        }
        trail.subtitle = first_str(obj, Field::Subtitle).unwrap_or_default();
        trail.description = first_str(obj, Field::Description).unwrap_or_default();
        trail.icon = validate::normalize_icon(first_str(obj, Field::Icon).as_deref());
        trail.color = validate::normalize_color(first_str(obj, Field::Color).as_deref());

        match first_array(obj, Field::Modules) {
            Some(modules) => trail.modules = self.modules(modules, warnings),
            None => {
                // Trail object that is really a single lesson.
                if first_alias(obj, Field::Content).is_some() || first_array(obj, Field::Questions).is_some() {
                    if let Some(module) = self.module(obj, 0, warnings) {
                        trail.modules.push(module);
                    }
                }
            }
        }
        if trail.modules.is_empty() {
            warnings.push(format!("Trail '{}' has no modules", validate::short(&trail.title)));
        }
        dedupe_module_slugs(&mut trail);
        Some(trail)
    }

    fn modules(&self, items: &[Value], warnings: &mut Vec<String>) -> Vec<ParsedModule> {
        items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| match item {
                Value::Object(obj) => self.module(obj, idx, warnings),
                Value::String(title) if !title.trim().is_empty() => Some(ParsedModule::new(title.trim())),
                _ => {
                    warnings.push(format!("Skipped module #{}: unsupported value", idx + 1));
                    None
                }
            })
            .collect()
    }

    pub fn module(&self, obj: &Map<String, Value>, index: usize, warnings: &mut Vec<String>) -> Option<ParsedModule> {
        let title = first_str(obj, Field::Title).unwrap_or_else(|| {
            warnings.push(format!("Module #{} has no title", index + 1));
            format!("Module {}", index + 1)
        });
        let mut module = ParsedModule::new(title);
        if let Some(slug) = first_str(obj, Field::Slug) {
            module.slug = slugify(&slug);
        }

        let raw_type = first_str(obj, Field::Type);
        let explicit_type = raw_type.is_some();
        module.module_type = validate::module_type_or_default(raw_type.as_deref(), warnings);
        module.points = validate::coerce_points(first_alias(obj, Field::Points), module.module_type);
        module.description = first_str(obj, Field::Description).unwrap_or_default();
        module.content = first_alias(obj, Field::Content).map(text_of).unwrap_or_default();
        module.level = first_str(obj, Field::Level);
        module.duration = first_str(obj, Field::Duration);
        module.requires_submission = first_alias(obj, Field::RequiresSubmission).is_some_and(truthy);

        if let Some(questions) = first_array(obj, Field::Questions) {
            module.questions = questions
                .iter()
                .filter_map(|q| question(q, warnings))
                .collect();
            if !explicit_type && !module.questions.is_empty() {
                module.module_type = ModuleType::Practice;
                module.points = validate::coerce_points(first_alias(obj, Field::Points), module.module_type);
            }
        } else if self.extract_embedded_questions {
            common::attach_questions(&mut module, explicit_type, warnings);
        }
        Some(module)
    }
}

/// Content may arrive as a string, a list of paragraphs or a nested object.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(text_of)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(obj) => first_str(obj, Field::Text).unwrap_or_default(),
        Value::Null => String::new(),
    }
}

fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `["a", "b"]` or `[{id, text}, ...]` -> labeled items; missing ids are
/// generated from `prefix`.
fn labeled_items(items: &[Value], prefix: &str) -> Vec<LabeledItem> {
    items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let generated = format!("{}{}", prefix, idx + 1);
            match item {
                Value::Object(obj) => {
                    let text = first_str(obj, Field::Text)?;
                    let id = first_alias(obj, Field::Id).and_then(id_of).unwrap_or(generated);
                    Some(LabeledItem::new(id, text))
                }
                other => {
                    let text = text_of(other);
                    (!text.is_empty()).then(|| LabeledItem::new(generated, text))
                }
            }
        })
        .collect()
}

/// Resolve a pair endpoint given either as an id or as item text.
fn resolve_id(raw: &Value, items: &[LabeledItem]) -> Option<String> {
    let key = id_of(raw)?;
    if items.iter().any(|i| i.id == key) {
        return Some(key);
    }
    items
        .iter()
        .find(|i| i.text.eq_ignore_ascii_case(&key))
        .map(|i| i.id.clone())
}

fn matching_data(obj: &Map<String, Value>) -> Option<MatchingData> {
    let left_items = labeled_items(first_array(obj, Field::LeftItems)?, "l");
    let right_items = labeled_items(first_array(obj, Field::RightItems)?, "r");
    let mut correct_pairs = BTreeMap::new();
    match first_alias(obj, Field::CorrectPairs) {
        Some(Value::Object(pairs)) => {
            for (left, right) in pairs {
                let left = resolve_id(&Value::String(left.clone()), &left_items);
                if let (Some(left), Some(right)) = (left, resolve_id(right, &right_items)) {
                    correct_pairs.insert(left, right);
                }
            }
        }
        Some(Value::Array(pairs)) => {
            for pair in pairs {
                let (left, right) = match pair {
                    Value::Array(two) if two.len() == 2 => (&two[0], &two[1]),
                    Value::Object(o) => match (o.get("left"), o.get("right")) {
                        (Some(l), Some(r)) => (l, r),
                        _ => continue,
                    },
                    _ => continue,
                };
                if let (Some(left), Some(right)) = (resolve_id(left, &left_items), resolve_id(right, &right_items)) {
                    correct_pairs.insert(left, right);
                }
            }
        }
        _ => {}
    }
    Some(MatchingData {
        left_items,
        right_items,
        correct_pairs,
    })
}

fn ordering_data(obj: &Map<String, Value>) -> Option<OrderingData> {
    let items = labeled_items(first_array(obj, Field::Items)?, "");
    let correct_order = first_array(obj, Field::CorrectOrder)
        .map(|order| order.iter().filter_map(|v| resolve_id(v, &items)).collect())
        .unwrap_or_else(|| items.iter().map(|i| i.id.clone()).collect());
    Some(OrderingData { items, correct_order })
}

fn case_data(obj: &Map<String, Value>, fallback_options: Option<&Vec<Value>>) -> Option<CaseAnalysisData> {
    let case_content = first_str(obj, Field::CaseContent).unwrap_or_default();
    let raw_options = first_array(obj, Field::Options).or(fallback_options)?;
    let options: Vec<CaseOption> = raw_options
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let generated = format!("o{}", idx + 1);
            match item {
                Value::Object(o) => Some(CaseOption {
                    id: first_alias(o, Field::Id).and_then(id_of).unwrap_or(generated),
                    text: first_str(o, Field::Text)?,
                    is_correct: first_alias(o, Field::IsCorrect).is_some_and(truthy),
                    explanation: first_str(o, Field::Explanation),
                }),
                other => {
                    let (text, correct) = option_with_marker(&text_of(other));
                    (!text.is_empty()).then_some(CaseOption {
                        id: generated,
                        text,
                        is_correct: correct,
                        explanation: None,
                    })
                }
            }
        })
        .collect();
    let min_correct_required = first_alias(obj, Field::MinCorrectRequired)
        .and_then(Value::as_u64)
        .map(|n| n.min(u32::MAX as u64) as u32)
        .unwrap_or(0);
    Some(CaseAnalysisData {
        case_content,
        options,
        min_correct_required,
    })
}

/// Option text with its answer marker removed. An option that is nothing
/// but a marker (`"*"`, `"✓"`) is kept verbatim and not marked.
fn option_with_marker(raw: &str) -> (String, bool) {
    let (text, correct) = common::strip_correct_markers(raw);
    if text.is_empty() {
        (raw.trim().to_string(), false)
    } else {
        (text, correct)
    }
}

/// Index of the correct option from a number (0-based), a digit string
/// (1-based), a letter, or the option text.
fn correct_index(raw: &Value, options: &[String]) -> Option<usize> {
    match raw {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => {
            let s = s.trim().trim_end_matches(['.', ')']);
            if let Ok(n) = s.parse::<usize>() {
                return n.checked_sub(1);
            }
            let mut chars = s.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                let lower = c.to_lowercase().next().unwrap_or(c);
                if lower.is_ascii_lowercase() {
                    return Some(lower as usize - 'a' as usize);
                }
                if let Some(idx) = "абвгдежз".chars().position(|x| x == lower) {
                    return Some(idx);
                }
            }
            options.iter().position(|o| o.eq_ignore_ascii_case(s))
        }
        _ => None,
    }
}

/// One question from a loosely typed value; `None` (with a warning) when it
/// cannot be rendered.
pub fn question(value: &Value, warnings: &mut Vec<String>) -> Option<ParsedQuestion> {
    let Some(obj) = value.as_object() else {
        warnings.push("Skipped a question that is not an object".into());
        return None;
    };
    let Some(text) = first_str(obj, Field::QuestionText) else {
        warnings.push("Dropped a question without text".into());
        return None;
    };
    let question_type = first_str(obj, Field::Type)
        .map(|t| validate::coerce_question_type(&t))
        .unwrap_or_default();

    let raw_options = first_array(obj, Field::Options);
    let explicit_answer = first_alias(obj, Field::CorrectAnswer);
    // Answer markers inside option text only count when nothing else says
    // which option is correct.
    let read_markers = explicit_answer.is_none()
        && !raw_options
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .any(|o| first_alias(o, Field::IsCorrect).is_some());
    let mut options = Vec::new();
    let mut marked = None;
    for item in raw_options.into_iter().flatten() {
        match item {
            Value::Object(o) => {
                if let Some(text) = first_str(o, Field::Text) {
                    if marked.is_none() && first_alias(o, Field::IsCorrect).is_some_and(truthy) {
                        marked = Some(options.len());
                    }
                    options.push(text);
                }
            }
            other => {
                let raw = text_of(other);
                let (text, correct) = if read_markers {
                    option_with_marker(&raw)
                } else {
                    (raw.trim().to_string(), false)
                };
                if correct && marked.is_none() {
                    marked = Some(options.len());
                }
                options.push(text);
            }
        }
    }
    let correct_answer = explicit_answer
        .and_then(|raw| correct_index(raw, &options))
        .or(marked)
        .unwrap_or(0);

    // Payload fields may sit under `data` or directly on the question.
    let payload = first_alias(obj, Field::Data).and_then(Value::as_object).unwrap_or(obj);
    let data = match question_type {
        QuestionType::SingleChoice => None,
        QuestionType::Matching => matching_data(payload).map(QuestionData::Matching),
        QuestionType::Ordering => ordering_data(payload).map(QuestionData::Ordering),
        QuestionType::CaseAnalysis => {
            case_data(payload, raw_options)
                .filter(|d| !d.options.is_empty())
                .map(QuestionData::CaseAnalysis)
        }
    };

    validate::finalize_question(
        ParsedQuestion {
            question: text,
            question_type,
            options,
            correct_answer,
            data,
            explanation: first_str(obj, Field::Explanation),
        },
        warnings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(value: Value) -> (Vec<ParsedTrail>, Vec<String>) {
        let mut warnings = Vec::new();
        let trails = Normalizer::DOCUMENT.trails(&value, &mut warnings);
        (trails, warnings)
    }

    #[test]
    fn test_trails_array() {
        let (trails, _) = normalize(json!({
            "trails": [{
                "title": "Rust Basics",
                "slug": "rust-basics",
                "color": "#ABC",
                "modules": [
                    {"title": "Ownership", "type": "theory", "content": "Moves and borrows"},
                    {"title": "Quiz", "type": "practice", "points": 80, "questions": [
                        {"question": "Is Rust memory safe?", "options": ["Yes", "No"], "correctAnswer": 0}
                    ]}
                ]
            }]
        }));
        assert_eq!(trails.len(), 1);
        let trail = &trails[0];
        assert_eq!(trail.slug, "rust-basics");
        assert_eq!(trail.color, "#aabbcc");
        assert_eq!(trail.modules.len(), 2);
        assert_eq!(trail.modules[1].points, 80);
        assert_eq!(trail.question_count(), 1);
    }

    #[test]
    fn test_russian_keys_single_trail() {
        let (trails, _) = normalize(json!({
            "название": "Вайб кодинг",
            "модули": [{"название": "Введение", "тип": "практика", "содержание": "Текст"}]
        }));
        assert_eq!(trails.len(), 1);
        assert_eq!(trails[0].title, "Вайб кодинг");
        assert_eq!(trails[0].modules[0].module_type, ModuleType::Practice);
        assert_eq!(trails[0].modules[0].points, 75);
    }

    #[test]
    fn test_orphan_modules_get_synthetic_trail() {
        let (trails, warnings) = normalize(json!({"lessons": [{"title": "A"}, {"title": "B"}]}));
        assert_eq!(trails.len(), 1);
        assert_eq!(trails[0].title, SYNTHETIC_TRAIL_TITLE);
        assert_eq!(trails[0].modules.len(), 2);
        assert!(!warnings.is_empty());

        let (trails, _) = normalize(json!([{"title": "A", "content": "x"}]));
        assert_eq!(trails[0].modules[0].title, "A");
    }

    #[test]
    fn test_unrecognized_value_yields_nothing() {
        assert!(normalize(json!({"foo": 1})).0.is_empty());
        assert!(normalize(json!([1, 2, 3])).0.is_empty());
        assert!(normalize(json!("text")).0.is_empty());
    }

    #[test]
    fn test_bad_question_does_not_drop_module() {
        let (trails, warnings) = normalize(json!({"trails": [{"title": "T", "modules": [
            {"title": "M", "questions": [
                {"question": "Only one option?", "options": ["a"]},
                {"question": "Fine?", "options": ["a", "b"], "correctAnswer": "b"}
            ]}
        ]}]}));
        let module = &trails[0].modules[0];
        assert_eq!(module.questions.len(), 1);
        assert_eq!(module.questions[0].correct_answer, 1);
        assert_eq!(module.module_type, ModuleType::Practice);
        assert!(warnings.iter().any(|w| w.contains("at least 2 options")));
    }

    #[test]
    fn test_option_objects_mark_correct() {
        let mut warnings = Vec::new();
        let q = question(
            &json!({"text": "Pick", "options": [{"text": "a"}, {"text": "b", "isCorrect": true}]}),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(q.correct_answer, 1);
    }

    #[test]
    fn test_textless_option_does_not_shift_correct_index() {
        let mut warnings = Vec::new();
        let q = question(
            &json!({"text": "Pick", "options": [{"id": "x"}, {"text": "a"}, {"text": "b", "isCorrect": true}]}),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(q.options, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(q.correct_answer, 1);
    }

    #[test]
    fn test_explicit_answer_keeps_option_text_verbatim() {
        let mut warnings = Vec::new();
        let q = question(
            &json!({"question": "Deref?", "options": ["&", "*", "Box*"], "correctAnswer": 1}),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(q.options, vec!["&".to_string(), "*".to_string(), "Box*".to_string()]);
        assert_eq!(q.correct_answer, 1);
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn test_markers_pick_the_answer_when_none_is_given() {
        let mut warnings = Vec::new();
        let q = question(&json!({"question": "Safe?", "options": ["No", "Yes*", "*"]}), &mut warnings).unwrap();
        assert_eq!(q.options, vec!["No".to_string(), "Yes".to_string(), "*".to_string()]);
        assert_eq!(q.correct_answer, 1);
    }

    #[test]
    fn test_matching_payload_with_text_pairs() {
        let mut warnings = Vec::new();
        let q = question(
            &json!({
                "question": "Match",
                "type": "MATCHING",
                "data": {
                    "leftItems": ["CTR", "ROI"],
                    "rightItems": [{"id": "x", "text": "Ratio"}, {"id": "y", "text": "Return"}],
                    "correctPairs": {"CTR": "x", "l2": "Return"}
                }
            }),
            &mut warnings,
        )
        .unwrap();
        let Some(QuestionData::Matching(data)) = q.data else {
            panic!("expected matching data");
        };
        assert_eq!(data.correct_pairs.get("l1").map(String::as_str), Some("x"));
        assert_eq!(data.correct_pairs.get("l2").map(String::as_str), Some("y"));
    }

    #[test]
    fn test_ordering_without_order_uses_listed_order() {
        let mut warnings = Vec::new();
        let q = question(
            &json!({"question": "Sort", "type": "ordering", "items": ["Plan", "Build", "Ship"]}),
            &mut warnings,
        )
        .unwrap();
        let Some(QuestionData::Ordering(data)) = q.data else {
            panic!("expected ordering data");
        };
        assert_eq!(data.correct_order, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_case_analysis_from_options() {
        let mut warnings = Vec::new();
        let q = question(
            &json!({
                "question": "What is wrong?",
                "type": "case_analysis",
                "caseContent": "fn main() { let x; }",
                "options": [
                    {"text": "x is never initialized", "isCorrect": true},
                    {"text": "Nothing"}
                ]
            }),
            &mut warnings,
        )
        .unwrap();
        let Some(QuestionData::CaseAnalysis(data)) = q.data else {
            panic!("expected case data");
        };
        assert_eq!(data.case_content, "fn main() { let x; }");
        assert_eq!(data.options.len(), 2);
        assert_eq!(data.min_correct_required, 1);
    }

    #[test]
    fn test_embedded_questions_only_for_documents() {
        let value = json!({"title": "T", "modules": [{"title": "M", "content": "Pick?\n- a*\n- b"}]});
        let mut warnings = Vec::new();
        let doc = Normalizer::DOCUMENT.trails(&value, &mut warnings);
        let model = Normalizer::MODEL.trails(&value, &mut warnings);
        assert_eq!(doc[0].question_count(), 1);
        assert_eq!(model[0].question_count(), 0);
    }

    #[test]
    fn test_serialized_trail_round_trips() {
        let mut trail = ParsedTrail::new("Round Trip");
        let mut module = ParsedModule::new("Quiz");
        module.module_type = ModuleType::Practice;
        module.points = 75;
        module.questions.push(ParsedQuestion::single_choice("Q?", vec!["a".into(), "b".into()], 1));
        trail.modules.push(module);
        let value = json!({"trails": [serde_json::to_value(&trail).unwrap()]});
        let (trails, _) = normalize(value);
        assert_eq!(trails, vec![trail]);
    }
}
