//! Type and range validation for loosely typed input.
//!
//! Everything coming from AI output or schema-less documents passes through
//! here before it enters the model. Invalid values are coerced to defaults,
//! under-populated question payloads are replaced with a synthesized one, and
//! every substitution leaves a warning behind.

use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use crate::model::{
    CaseAnalysisData, CaseOption, LabeledItem, MatchingData, ModuleType, OrderingData,
    ParsedQuestion, QuestionData, QuestionType, DEFAULT_TRAIL_COLOR, DEFAULT_TRAIL_ICON,
};

static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#?([0-9a-fA-F]{6}|[0-9a-fA-F]{3})$").unwrap());
static PAIR_ARROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*(?:->|→|=>|—>|–>)\s*").unwrap());

/// Map free-form module type names onto the closed enum.
pub fn coerce_module_type(raw: &str) -> Option<ModuleType> {
    let lower = raw.trim().to_lowercase();
    let module_type = match lower.as_str() {
        "theory" | "теория" | "lecture" | "лекция" | "reading" | "теоретический" | "материал" => {
            ModuleType::Theory
        }
        "practice" | "практика" | "practical" | "практический" | "quiz" | "тест" | "test"
        | "exercise" | "упражнение" | "задание" => ModuleType::Practice,
        "project" | "проект" | "assignment" | "capstone" | "финальный проект" => ModuleType::Project,
        _ => return None,
    };
    Some(module_type)
}

/// Module type with THEORY as the fallback.
pub fn module_type_or_default(raw: Option<&str>, warnings: &mut Vec<String>) -> ModuleType {
    match raw {
        None => ModuleType::Theory,
        Some(raw) => coerce_module_type(raw).unwrap_or_else(|| {
            warnings.push(format!("Unknown module type '{}', using THEORY", raw));
            ModuleType::Theory
        }),
    }
}

pub fn coerce_question_type(raw: &str) -> QuestionType {
    let lower = raw.trim().to_lowercase().replace(['-', ' '], "_");
    match lower.as_str() {
        "matching" | "match" | "соответствие" | "сопоставление" | "pairs" => QuestionType::Matching,
        "ordering" | "order" | "sequence" | "sort" | "порядок" | "последовательность" => {
            QuestionType::Ordering
        }
        "case_analysis" | "case" | "caseanalysis" | "кейс" | "анализ_кейса" | "scenario" => {
            QuestionType::CaseAnalysis
        }
        _ => QuestionType::SingleChoice,
    }
}

/// Positive integer points, else the per-type default.
pub fn coerce_points(raw: Option<&Value>, module_type: ModuleType) -> u32 {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(p) if p.is_finite() && p >= 1.0 => p.round().min(100_000.0) as u32,
        _ => module_type.default_points(),
    }
}

/// `#rrggbb`, lowercased; three-digit shorthand is expanded.
pub fn normalize_color(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return DEFAULT_TRAIL_COLOR.to_string();
    };
    let Some(caps) = HEX_COLOR.captures(raw.trim()) else {
        return DEFAULT_TRAIL_COLOR.to_string();
    };
    let hex = caps[1].to_lowercase();
    if hex.len() == 3 {
        let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
        format!("#{}", expanded)
    } else {
        format!("#{}", hex)
    }
}

/// Keep short pictographic icons, replace anything else (words, URLs).
pub fn normalize_icon(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(icon)
            if !icon.is_empty()
                && icon.chars().count() <= 8
                && !icon.chars().any(|c| c.is_alphanumeric()) =>
        {
            icon.to_string()
        }
        _ => DEFAULT_TRAIL_ICON.to_string(),
    }
}

/// Split `left -> right` option strings into a matching payload. Right-hand
/// items are deduplicated by text, so several left items may share one right id.
pub fn matching_from_options(options: &[String]) -> Option<MatchingData> {
    let mut left_items = Vec::new();
    let mut right_items: Vec<LabeledItem> = Vec::new();
    let mut correct_pairs = BTreeMap::new();

    for option in options {
        let mut parts = PAIR_ARROW.splitn(option, 2);
        let (Some(left), Some(right)) = (parts.next(), parts.next()) else {
            continue;
        };
        let (left, right) = (left.trim(), right.trim());
        if left.is_empty() || right.is_empty() {
            continue;
        }
        let left_id = format!("l{}", left_items.len() + 1);
        left_items.push(LabeledItem::new(left_id.clone(), left));

        let right_id = match right_items
            .iter()
            .find(|item| item.text.eq_ignore_ascii_case(right))
        {
            Some(existing) => existing.id.clone(),
            None => {
                let id = format!("r{}", right_items.len() + 1);
                right_items.push(LabeledItem::new(id.clone(), right));
                id
            }
        };
        correct_pairs.insert(left_id, right_id);
    }

    (left_items.len() >= 2).then_some(MatchingData {
        left_items,
        right_items,
        correct_pairs,
    })
}

pub fn looks_like_pairs(options: &[String]) -> bool {
    options.len() >= 2 && options.iter().all(|o| PAIR_ARROW.is_match(o))
}

/// Items in their listed order; the listed order is the correct one.
pub fn ordering_from_options(options: &[String]) -> Option<OrderingData> {
    let items: Vec<LabeledItem> = options
        .iter()
        .filter(|o| !o.trim().is_empty())
        .enumerate()
        .map(|(i, text)| LabeledItem::new(format!("{}", i + 1), text.trim()))
        .collect();
    if items.len() < 2 {
        return None;
    }
    let correct_order = items.iter().map(|item| item.id.clone()).collect();
    Some(OrderingData {
        items,
        correct_order,
    })
}

pub fn default_matching() -> MatchingData {
    MatchingData {
        left_items: vec![LabeledItem::new("l1", "Term 1"), LabeledItem::new("l2", "Term 2")],
        right_items: vec![
            LabeledItem::new("r1", "Definition 1"),
            LabeledItem::new("r2", "Definition 2"),
        ],
        correct_pairs: BTreeMap::from([
            ("l1".to_string(), "r1".to_string()),
            ("l2".to_string(), "r2".to_string()),
        ]),
    }
}

pub fn default_ordering() -> OrderingData {
    let items = vec![
        LabeledItem::new("1", "Step 1"),
        LabeledItem::new("2", "Step 2"),
        LabeledItem::new("3", "Step 3"),
    ];
    OrderingData {
        correct_order: items.iter().map(|i| i.id.clone()).collect(),
        items,
    }
}

pub fn default_case(question: &ParsedQuestion) -> CaseAnalysisData {
    let mut options: Vec<CaseOption> = question
        .options
        .iter()
        .enumerate()
        .map(|(i, text)| CaseOption {
            id: format!("o{}", i + 1),
            text: text.clone(),
            is_correct: i == question.correct_answer,
            explanation: None,
        })
        .collect();
    if options.len() < 2 {
        options = vec![
            CaseOption {
                id: "o1".into(),
                text: "Option A".into(),
                is_correct: true,
                explanation: None,
            },
            CaseOption {
                id: "o2".into(),
                text: "Option B".into(),
                is_correct: false,
                explanation: None,
            },
        ];
    }
    CaseAnalysisData {
        case_content: question.question.clone(),
        options,
        min_correct_required: 1,
    }
}

/// Make a matching payload internally consistent or reject it.
fn repair_matching(mut data: MatchingData) -> Option<MatchingData> {
    dedupe_ids(&mut data.left_items, "l");
    dedupe_ids(&mut data.right_items, "r");
    let left: HashSet<&str> = data.left_items.iter().map(|i| i.id.as_str()).collect();
    let right: HashSet<&str> = data.right_items.iter().map(|i| i.id.as_str()).collect();
    let pairs: BTreeMap<String, String> = data
        .correct_pairs
        .iter()
        .filter(|(l, r)| left.contains(l.as_str()) && right.contains(r.as_str()))
        .map(|(l, r)| (l.clone(), r.clone()))
        .collect();
    if data.left_items.len() < 2 || data.right_items.is_empty() || pairs.is_empty() {
        return None;
    }
    data.correct_pairs = pairs;
    Some(data)
}

/// Guarantee `correct_order` is a permutation of the item ids.
fn repair_ordering(mut data: OrderingData) -> Option<OrderingData> {
    dedupe_ids(&mut data.items, "");
    if data.items.len() < 2 {
        return None;
    }
    let ids: Vec<String> = data.items.iter().map(|i| i.id.clone()).collect();
    let mut seen = HashSet::new();
    let mut order: Vec<String> = data
        .correct_order
        .iter()
        .filter(|id| ids.contains(id) && seen.insert((*id).clone()))
        .cloned()
        .collect();
    for id in &ids {
        if !seen.contains(id) {
            order.push(id.clone());
        }
    }
    data.correct_order = order;
    Some(data)
}

fn repair_case(mut data: CaseAnalysisData, warnings: &mut Vec<String>) -> Option<CaseAnalysisData> {
    data.options.retain(|o| !o.text.trim().is_empty());
    if data.options.len() < 2 {
        return None;
    }
    let mut seen = HashSet::new();
    for (i, option) in data.options.iter_mut().enumerate() {
        if option.id.trim().is_empty() || !seen.insert(option.id.clone()) {
            option.id = format!("o{}", i + 1);
            seen.insert(option.id.clone());
        }
    }
    let correct = data.options.iter().filter(|o| o.is_correct).count() as u32;
    if correct == 0 {
        warnings.push("Case analysis question had no correct option; marking the first one".into());
        data.options[0].is_correct = true;
    }
    let correct = correct.max(1);
    data.min_correct_required = match data.min_correct_required {
        0 => correct,
        n => n.min(correct),
    };
    Some(data)
}

/// Replace empty or duplicate ids with positional ones.
fn dedupe_ids(items: &mut Vec<LabeledItem>, prefix: &str) {
    items.retain(|i| !i.text.trim().is_empty());
    let mut seen = HashSet::new();
    for idx in 0..items.len() {
        let id = items[idx].id.trim().to_string();
        if id.is_empty() || !seen.insert(id.clone()) {
            let mut n = idx + 1;
            let mut fresh = format!("{}{}", prefix, n);
            while seen.contains(&fresh) {
                n += 1;
                fresh = format!("{}{}", prefix, n);
            }
            seen.insert(fresh.clone());
            items[idx].id = fresh;
        }
    }
}

/// Final gate for every question. Returns `None` when the question has to be
/// dropped (warning recorded).
pub fn finalize_question(mut q: ParsedQuestion, warnings: &mut Vec<String>) -> Option<ParsedQuestion> {
    q.question = q.question.trim().to_string();
    // Blank options are dropped; the answer index follows its option.
    let mut kept = Vec::with_capacity(q.options.len());
    let mut answer = None;
    for (idx, option) in q.options.iter().enumerate() {
        let option = option.trim();
        if option.is_empty() {
            continue;
        }
        if idx == q.correct_answer {
            answer = Some(kept.len());
        }
        kept.push(option.to_string());
    }
    q.options = kept;
    if q.question.is_empty() {
        warnings.push("Dropped a question without text".into());
        return None;
    }
    let label = short(&q.question);

    match q.question_type {
        QuestionType::SingleChoice => {
            if q.options.len() < 2 {
                warnings.push(format!(
                    "Dropped question '{}': single choice needs at least 2 options",
                    label
                ));
                return None;
            }
            q.correct_answer = answer.unwrap_or_else(|| {
                warnings.push(format!(
                    "Question '{}' pointed at a missing option; using the first one",
                    label
                ));
                0
            });
            q.data = None;
        }
        QuestionType::Matching => {
            let supplied = match q.data.take() {
                Some(QuestionData::Matching(data)) => repair_matching(data),
                _ => None,
            };
            let data = supplied
                .or_else(|| matching_from_options(&q.options))
                .unwrap_or_else(|| {
                    warnings.push(format!("Question '{}': matching data incomplete, using defaults", label));
                    default_matching()
                });
            q.data = Some(QuestionData::Matching(data));
            q.correct_answer = 0;
        }
        QuestionType::Ordering => {
            let supplied = match q.data.take() {
                Some(QuestionData::Ordering(data)) => repair_ordering(data),
                _ => None,
            };
            let data = supplied
                .or_else(|| ordering_from_options(&q.options))
                .unwrap_or_else(|| {
                    warnings.push(format!("Question '{}': ordering data incomplete, using defaults", label));
                    default_ordering()
                });
            q.data = Some(QuestionData::Ordering(data));
            q.correct_answer = 0;
        }
        QuestionType::CaseAnalysis => {
            let supplied = match q.data.take() {
                Some(QuestionData::CaseAnalysis(data)) => repair_case(data, warnings),
                _ => None,
            };
            let data = match supplied {
                Some(mut data) => {
                    if data.case_content.trim().is_empty() {
                        data.case_content = q.question.clone();
                    }
                    data
                }
                None => {
                    if q.options.len() < 2 {
                        warnings.push(format!(
                            "Question '{}': case analysis data incomplete, using defaults",
                            label
                        ));
                    }
                    default_case(&q)
                }
            };
            q.data = Some(QuestionData::CaseAnalysis(data));
            q.correct_answer = 0;
        }
    }
    Some(q)
}

pub(crate) fn short(text: &str) -> String {
    let mut s: String = text.chars().take(60).collect();
    if text.chars().count() > 60 {
        s.push('…');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(question_type: QuestionType, options: &[&str]) -> ParsedQuestion {
        ParsedQuestion {
            question: "Q?".into(),
            question_type,
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_answer: 0,
            data: None,
            explanation: None,
        }
    }

    #[test]
    fn test_module_type_coercion() {
        assert_eq!(coerce_module_type("Practice"), Some(ModuleType::Practice));
        assert_eq!(coerce_module_type("проект"), Some(ModuleType::Project));
        assert_eq!(coerce_module_type("weird"), None);
        let mut warnings = vec![];
        assert_eq!(module_type_or_default(Some("weird"), &mut warnings), ModuleType::Theory);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_question_type_coercion() {
        assert_eq!(coerce_question_type("CASE_ANALYSIS"), QuestionType::CaseAnalysis);
        assert_eq!(coerce_question_type("case-analysis"), QuestionType::CaseAnalysis);
        assert_eq!(coerce_question_type("matching"), QuestionType::Matching);
        assert_eq!(coerce_question_type("порядок"), QuestionType::Ordering);
        assert_eq!(coerce_question_type("nonsense"), QuestionType::SingleChoice);
    }

    #[test]
    fn test_points_coercion() {
        assert_eq!(coerce_points(Some(&json!(120)), ModuleType::Theory), 120);
        assert_eq!(coerce_points(Some(&json!("80")), ModuleType::Theory), 80);
        assert_eq!(coerce_points(Some(&json!(-5)), ModuleType::Practice), 75);
        assert_eq!(coerce_points(Some(&json!("lots")), ModuleType::Project), 100);
        assert_eq!(coerce_points(None, ModuleType::Theory), 50);
    }

    #[test]
    fn test_color_and_icon() {
        assert_eq!(normalize_color(Some("#FFAA00")), "#ffaa00");
        assert_eq!(normalize_color(Some("abc")), "#aabbcc");
        assert_eq!(normalize_color(Some("red")), DEFAULT_TRAIL_COLOR);
        assert_eq!(normalize_icon(Some("🚀")), "🚀");
        assert_eq!(normalize_icon(Some("rocket")), DEFAULT_TRAIL_ICON);
    }

    #[test]
    fn test_matching_many_to_one() {
        let q = question(QuestionType::Matching, &["CTR -> AI", "CPC -> AI", "ROI -> Developer"]);
        let mut warnings = vec![];
        let q = finalize_question(q, &mut warnings).unwrap();
        let Some(QuestionData::Matching(data)) = q.data else {
            panic!("expected matching data");
        };
        assert_eq!(data.left_items.len(), 3);
        assert_eq!(data.right_items.len(), 2);
        let ai_id = &data.right_items[0].id;
        assert_eq!(data.right_items[0].text, "AI");
        assert_eq!(&data.correct_pairs["l1"], ai_id);
        assert_eq!(&data.correct_pairs["l2"], ai_id);
        assert_eq!(data.correct_pairs["l3"], data.right_items[1].id);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_single_choice_needs_two_options() {
        let mut warnings = vec![];
        assert!(finalize_question(question(QuestionType::SingleChoice, &["only"]), &mut warnings).is_none());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_out_of_range_answer_is_reset() {
        let mut q = question(QuestionType::SingleChoice, &["a", "b"]);
        q.correct_answer = 7;
        let mut warnings = vec![];
        let q = finalize_question(q, &mut warnings).unwrap();
        assert_eq!(q.correct_answer, 0);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_blank_options_keep_answer_on_its_option() {
        let mut q = question(QuestionType::SingleChoice, &["", "a", " ", "b"]);
        q.correct_answer = 3;
        let mut warnings = vec![];
        let q = finalize_question(q, &mut warnings).unwrap();
        assert_eq!(q.options, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(q.correct_answer, 1);
        assert!(warnings.is_empty());
    }

    fn assert_permutation(data: &OrderingData) {
        let mut ids: Vec<_> = data.items.iter().map(|i| i.id.clone()).collect();
        let mut order = data.correct_order.clone();
        ids.sort();
        order.sort();
        assert_eq!(ids, order);
    }

    #[test]
    fn test_ordering_is_always_a_permutation() {
        let mut warnings = vec![];
        let defaulted = finalize_question(question(QuestionType::Ordering, &[]), &mut warnings).unwrap();
        let Some(QuestionData::Ordering(data)) = defaulted.data else {
            panic!("expected ordering data");
        };
        assert_permutation(&data);

        let mut broken = question(QuestionType::Ordering, &[]);
        broken.data = Some(QuestionData::Ordering(OrderingData {
            items: vec![
                LabeledItem::new("a", "First"),
                LabeledItem::new("b", "Second"),
                LabeledItem::new("a", "Third"),
            ],
            correct_order: vec!["b".into(), "zzz".into(), "b".into()],
        }));
        let repaired = finalize_question(broken, &mut warnings).unwrap();
        let Some(QuestionData::Ordering(data)) = repaired.data else {
            panic!("expected ordering data");
        };
        assert_eq!(data.items.len(), 3);
        assert_eq!(data.correct_order[0], "b");
        assert_permutation(&data);
    }

    #[test]
    fn test_ordering_from_options_keeps_listed_order() {
        let data = ordering_from_options(&["Plan".into(), "Build".into(), "Ship".into()]).unwrap();
        assert_eq!(data.correct_order, vec!["1", "2", "3"]);
        assert_eq!(data.items[2].text, "Ship");
    }

    #[test]
    fn test_case_analysis_min_correct_defaults() {
        let mut q = question(QuestionType::CaseAnalysis, &[]);
        q.data = Some(QuestionData::CaseAnalysis(CaseAnalysisData {
            case_content: "fn main() {}".into(),
            options: vec![
                CaseOption { id: "a".into(), text: "Compiles".into(), is_correct: true, explanation: None },
                CaseOption { id: "b".into(), text: "Prints".into(), is_correct: false, explanation: None },
                CaseOption { id: "c".into(), text: "Is valid".into(), is_correct: true, explanation: None },
            ],
            min_correct_required: 0,
        }));
        let mut warnings = vec![];
        let q = finalize_question(q, &mut warnings).unwrap();
        let Some(QuestionData::CaseAnalysis(data)) = q.data else {
            panic!("expected case data");
        };
        assert_eq!(data.min_correct_required, 2);
    }

    #[test]
    fn test_case_analysis_without_data_uses_options() {
        let mut q = question(QuestionType::CaseAnalysis, &["Leak", "No leak"]);
        q.correct_answer = 1;
        let mut warnings = vec![];
        let q = finalize_question(q, &mut warnings).unwrap();
        let Some(QuestionData::CaseAnalysis(data)) = q.data else {
            panic!("expected case data");
        };
        assert_eq!(data.options.len(), 2);
        assert!(data.options[1].is_correct);
        assert_eq!(data.min_correct_required, 1);
        assert!(warnings.is_empty());
    }
}
