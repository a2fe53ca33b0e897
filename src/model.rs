//! Normalized curriculum model produced by every parser.
//!
//! Wire names follow the import-review layer: camelCase fields,
//! `SCREAMING_SNAKE_CASE` enum values, lowercase `parseMethod`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    #[default]
    SingleChoice,
    Matching,
    Ordering,
    CaseAnalysis,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::SingleChoice => write!(f, "SINGLE_CHOICE"),
            QuestionType::Matching => write!(f, "MATCHING"),
            QuestionType::Ordering => write!(f, "ORDERING"),
            QuestionType::CaseAnalysis => write!(f, "CASE_ANALYSIS"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleType {
    #[default]
    Theory,
    Practice,
    Project,
}

impl ModuleType {
    /// Points awarded when the source does not say otherwise.
    pub fn default_points(self) -> u32 {
        match self {
            ModuleType::Theory => 50,
            ModuleType::Practice => 75,
            ModuleType::Project => 100,
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleType::Theory => write!(f, "THEORY"),
            ModuleType::Practice => write!(f, "PRACTICE"),
            ModuleType::Project => write!(f, "PROJECT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    #[default]
    Code,
    Ai,
    Hybrid,
}

impl fmt::Display for ParseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMethod::Code => write!(f, "code"),
            ParseMethod::Ai => write!(f, "ai"),
            ParseMethod::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// An `{id, text}` entry used by matching and ordering payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledItem {
    pub id: String,
    pub text: String,
}

impl LabeledItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingData {
    pub left_items: Vec<LabeledItem>,
    pub right_items: Vec<LabeledItem>,
    /// left id -> right id; several left ids may share one right id.
    pub correct_pairs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderingData {
    pub items: Vec<LabeledItem>,
    pub correct_order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseOption {
    pub id: String,
    pub text: String,
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseAnalysisData {
    pub case_content: String,
    pub options: Vec<CaseOption>,
    pub min_correct_required: u32,
}

/// Type-specific question payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionData {
    Matching(MatchingData),
    Ordering(OrderingData),
    CaseAnalysis(CaseAnalysisData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedQuestion {
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<QuestionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl ParsedQuestion {
    pub fn single_choice(question: impl Into<String>, options: Vec<String>, correct: usize) -> Self {
        Self {
            question: question.into(),
            question_type: QuestionType::SingleChoice,
            options,
            correct_answer: correct,
            data: None,
            explanation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedModule {
    pub title: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub points: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub questions: Vec<ParsedQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default)]
    pub requires_submission: bool,
}

impl ParsedModule {
    /// A THEORY module with default points and a slug derived from the title.
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            slug: crate::parser::common::slugify(&title),
            title,
            module_type: ModuleType::Theory,
            points: ModuleType::Theory.default_points(),
            description: String::new(),
            content: String::new(),
            questions: Vec::new(),
            level: None,
            duration: None,
            requires_submission: false,
        }
    }
}

pub const DEFAULT_TRAIL_ICON: &str = "📚";
pub const DEFAULT_TRAIL_COLOR: &str = "#6366f1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTrail {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    pub icon: String,
    pub color: String,
    #[serde(default)]
    pub modules: Vec<ParsedModule>,
}

impl ParsedTrail {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            slug: crate::parser::common::slugify(&title),
            title,
            subtitle: String::new(),
            description: String::new(),
            icon: DEFAULT_TRAIL_ICON.to_string(),
            color: DEFAULT_TRAIL_COLOR.to_string(),
            modules: Vec::new(),
        }
    }

    pub fn question_count(&self) -> usize {
        self.modules.iter().map(|m| m.questions.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceCriterion {
    pub name: String,
    pub description: String,
    pub score: u32,
    pub max_score: u32,
    pub met: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceDetails {
    pub total_score: u32,
    pub max_possible_score: u32,
    pub percentage: u32,
    pub criteria: Vec<ConfidenceCriterion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub success: bool,
    pub trails: Vec<ParsedTrail>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub parse_method: ParseMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_details: Option<ConfidenceDetails>,
}

impl ParseResult {
    /// Build a result from parsed trails; success iff at least one trail survived.
    pub fn from_trails(trails: Vec<ParsedTrail>, warnings: Vec<String>, method: ParseMethod) -> Self {
        let mut errors = Vec::new();
        if trails.is_empty() {
            errors.push("No trails could be extracted from the document".to_string());
        }
        Self {
            success: !trails.is_empty(),
            trails,
            warnings,
            errors,
            parse_method: method,
            confidence_details: None,
        }
    }

    pub fn failure(method: ParseMethod, error: impl Into<String>) -> Self {
        Self {
            success: false,
            trails: Vec::new(),
            warnings: Vec::new(),
            errors: vec![error.into()],
            parse_method: method,
            confidence_details: None,
        }
    }

    pub fn module_count(&self) -> usize {
        self.trails.iter().map(|t| t.modules.len()).sum()
    }

    pub fn question_count(&self) -> usize {
        self.trails.iter().map(ParsedTrail::question_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_points_per_type() {
        assert_eq!(ModuleType::Theory.default_points(), 50);
        assert_eq!(ModuleType::Practice.default_points(), 75);
        assert_eq!(ModuleType::Project.default_points(), 100);
    }

    #[test]
    fn test_wire_names() {
        let mut module = ParsedModule::new("Intro");
        module.questions.push(ParsedQuestion::single_choice(
            "What?",
            vec!["a".into(), "b".into()],
            1,
        ));
        let json = serde_json::to_value(&module).unwrap();
        assert_eq!(json["type"], "THEORY");
        assert_eq!(json["requiresSubmission"], false);
        assert_eq!(json["questions"][0]["type"], "SINGLE_CHOICE");
        assert_eq!(json["questions"][0]["correctAnswer"], 1);
    }

    #[test]
    fn test_parse_method_serializes_lowercase() {
        let result = ParseResult::from_trails(vec![], vec![], ParseMethod::Hybrid);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["parseMethod"], "hybrid");
        assert_eq!(json["success"], false);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_matching_data_serializes_camel_case() {
        let data = QuestionData::Matching(MatchingData {
            left_items: vec![LabeledItem::new("l1", "CTR")],
            right_items: vec![LabeledItem::new("r1", "AI")],
            correct_pairs: BTreeMap::from([("l1".to_string(), "r1".to_string())]),
        });
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["leftItems"][0]["text"], "CTR");
        assert_eq!(json["correctPairs"]["l1"], "r1");
    }
}
