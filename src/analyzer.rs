//! Structure analysis with an explainable confidence score.
//!
//! Two passes over the text:
//! 1. line-by-line matching against five configurable marker families
//!    (trail, module, question, answer, correct-answer);
//! 2. free-form heuristics over the whole text for natural-language section
//!    cues ("Модуль первый", "Lesson №3", inline quizzes, ...).
//!
//! The score is the sum of five independently reported criteria so callers
//! can see why a document scored the way it did.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::model::{ConfidenceCriterion, ConfidenceDetails};

const TRAIL_MAX: u32 = 20;
const MODULE_MAX: u32 = 25;
const QUESTION_MAX: u32 = 20;
const STRUCTURE_MAX: u32 = 20;
const FREEFORM_MAX: u32 = 15;

/// Marker families matched line by line.
#[derive(Debug, Clone)]
pub struct StructurePatterns {
    pub trail_markers: Vec<Regex>,
    pub module_markers: Vec<Regex>,
    pub question_markers: Vec<Regex>,
    pub answer_markers: Vec<Regex>,
    pub correct_markers: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("built-in structure pattern"))
        .collect()
}

impl Default for StructurePatterns {
    fn default() -> Self {
        Self {
            trail_markers: compile(&[
                r"(?i)^\s*={2,}\s*(trail|трейл|course|курс)\s*={2,}\s*$",
                r"(?i)^\s*\[(trail|трейл|course|курс)\]\s*$",
                r"(?i)^\s*(trail|трейл|курс|course)\s*:\s*\S",
            ]),
            module_markers: compile(&[
                r"(?i)^\s*={2,}\s*(module|модуль|lesson|урок)\s*={2,}\s*$",
                r"(?i)^\s*\[(module|модуль|lesson|урок)\]\s*$",
                r"(?i)^\s*#{1,3}\s*(module|модуль|lesson|урок|занятие)\b",
            ]),
            question_markers: compile(&[
                r"(?i)^\s*={2,}\s*(questions|вопросы|quiz|тест)\s*={2,}\s*$",
                r"(?i)^\s*(q|в|вопрос|question)\s*№?\s*\d*\s*[:.)]\s*\S",
            ]),
            answer_markers: compile(&[
                r"^\s*[-•]\s+\S",
                r"^\s*\[[ xX✓✔]\]\s*\S",
                r"^\s*[a-dа-гA-DА-Г][.)]\s+\S",
            ]),
            correct_markers: compile(&[
                r"\S\s*\*\s*$",
                r"(?i)\((correct|правильный|правильно|верно)\)",
                r"[✓✔]",
                r"^\s*[-*]?\s*\[[xX]\]",
            ]),
        }
    }
}

/// A named free-form heuristic family.
pub struct Heuristic {
    pub name: &'static str,
    pub pattern: Regex,
    /// Score contributed per match.
    pub weight: u32,
    /// Matches beyond this count add nothing.
    pub max_hits: usize,
}

impl Heuristic {
    fn new(name: &'static str, pattern: &str, weight: u32, max_hits: usize) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("built-in heuristic pattern"),
            weight,
            max_hits,
        }
    }

    pub fn score(&self, text: &str) -> u32 {
        let hits = self.pattern.find_iter(text).take(self.max_hits).count();
        hits as u32 * self.weight
    }
}

/// Prioritized free-form heuristics; extend the list to add new cues.
pub static FREEFORM_HEURISTICS: LazyLock<Vec<Heuristic>> = LazyLock::new(|| {
    vec![
        Heuristic::new(
            "ordinal_section",
            r"(?im)^\s*(модуль|module|урок|lesson|занятие|часть|part|глава|chapter)\s+(первый|первая|второй|вторая|третий|третья|четвертый|пятый|один|два|три|one|two|three|four|five|first|second|third|[ivx]+|\d+)\b",
            3,
            4,
        ),
        Heuristic::new(
            "numbered_lesson",
            r"(?i)(урок|занятие|lesson|модуль|module)\s*№\s*\d+",
            3,
            3,
        ),
        Heuristic::new(
            "material_heading",
            r"(?i)(теоретический материал|theoretical material|практическое задание|practical (task|assignment)|домашнее задание|homework|контрольные вопросы|review questions)",
            2,
            3,
        ),
        Heuristic::new(
            "inline_question",
            r"[^\n?]{5,}\?[ \t]*(1[.)]|[aа][.)])[ \t]*\S[^\n]*?[ \t](2[.)]|[bб][.)])[ \t]*\S",
            3,
            3,
        ),
        Heuristic::new(
            "question_with_numbered_answers",
            r"(?m)^[^\n]{5,}\?[ \t]*\n[ \t]*(1[.)]|[aа][.)])\s+\S",
            2,
            3,
        ),
        Heuristic::new(
            "quiz_heading",
            r"(?im)^\s*#*\s*(тест|test|quiz|вопросы для самопроверки|self-check)\s*:?\s*$",
            2,
            2,
        ),
    ]
});

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureAnalysis {
    pub has_structured_format: bool,
    pub has_trail_markers: bool,
    pub has_module_markers: bool,
    pub has_question_markers: bool,
    pub detected_trails: usize,
    pub detected_modules: usize,
    pub detected_questions: usize,
    pub confidence: u32,
    pub confidence_details: ConfidenceDetails,
}

/// Line-pattern and free-form scan. Pure, no I/O.
pub fn analyze(text: &str, patterns: &StructurePatterns) -> StructureAnalysis {
    let mut trails = 0usize;
    let mut modules = 0usize;
    let mut questions = 0usize;
    let mut answers = 0usize;
    let mut corrects = 0usize;
    let mut metadata_lines = 0usize;
    let mut separators = 0usize;

    let any = |set: &[Regex], line: &str| set.iter().any(|re| re.is_match(line));

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if any(&patterns.trail_markers, trimmed) {
            trails += 1;
        }
        if any(&patterns.module_markers, trimmed) {
            modules += 1;
        }
        if any(&patterns.question_markers, trimmed) {
            questions += 1;
        }
        if any(&patterns.answer_markers, trimmed) {
            answers += 1;
            if any(&patterns.correct_markers, trimmed) {
                corrects += 1;
            }
        }
        if crate::parser::common::parse_meta_line(trimmed).is_some() {
            metadata_lines += 1;
        }
        if trimmed == "---" {
            separators += 1;
        }
    }

    let freeform_hits: Vec<(&'static str, u32)> = FREEFORM_HEURISTICS
        .iter()
        .map(|h| (h.name, h.score(text)))
        .filter(|(_, score)| *score > 0)
        .collect();
    let freeform_raw: u32 = freeform_hits.iter().map(|(_, s)| s).sum();

    let trail_score = if trails > 0 { TRAIL_MAX } else { 0 };
    let module_score = if modules > 0 {
        (10 + 5 * modules as u32).min(MODULE_MAX)
    } else {
        0
    };
    let question_score = if questions > 0 {
        (8 + 4 * questions as u32).min(QUESTION_MAX)
    } else {
        0
    };
    let structured_elements = trails + modules + questions + answers + corrects + metadata_lines + separators;
    let structure_score = (structured_elements as u32 * 2).min(STRUCTURE_MAX);
    let freeform_score = freeform_raw.min(FREEFORM_MAX);

    let freeform_description = if freeform_hits.is_empty() {
        "No natural-language section cues".to_string()
    } else {
        let names: Vec<&str> = freeform_hits.iter().map(|(n, _)| *n).collect();
        format!("Free-form cues: {}", names.join(", "))
    };

    let criteria = vec![
        criterion(
            "trail_markers",
            format!("{} explicit trail marker(s)", trails),
            trail_score,
            TRAIL_MAX,
        ),
        criterion(
            "module_structure",
            format!("{} explicit module marker(s)", modules),
            module_score,
            MODULE_MAX,
        ),
        criterion(
            "questions",
            format!("{} question marker(s), {} answer line(s)", questions, answers),
            question_score,
            QUESTION_MAX,
        ),
        criterion(
            "structured_elements",
            format!("{} structured line(s) (markers, metadata, answers, separators)", structured_elements),
            structure_score,
            STRUCTURE_MAX,
        ),
        criterion("freeform_cues", freeform_description, freeform_score, FREEFORM_MAX),
    ];

    let max_possible: u32 = criteria.iter().map(|c| c.max_score).sum();
    let total: u32 = criteria.iter().map(|c| c.score).sum::<u32>().min(100);
    let percentage = if max_possible == 0 { 0 } else { total * 100 / max_possible };

    StructureAnalysis {
        has_structured_format: trails > 0 || modules > 0,
        has_trail_markers: trails > 0,
        has_module_markers: modules > 0,
        has_question_markers: questions > 0,
        detected_trails: trails,
        detected_modules: modules,
        detected_questions: questions,
        confidence: total,
        confidence_details: ConfidenceDetails {
            total_score: total,
            max_possible_score: max_possible,
            percentage,
            criteria,
        },
    }
}

/// `analyze` with the built-in pattern set.
pub fn analyze_default(text: &str) -> StructureAnalysis {
    static DEFAULT: LazyLock<StructurePatterns> = LazyLock::new(StructurePatterns::default);
    analyze(text, &DEFAULT)
}

fn criterion(name: &str, description: String, score: u32, max_score: u32) -> ConfidenceCriterion {
    ConfidenceCriterion {
        name: name.to_string(),
        description,
        score,
        max_score,
        met: score > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_prose_scores_zero() {
        let text = "Rust is a systems programming language.\nIt focuses on safety and speed.\n\nMany teams use it today.";
        let analysis = analyze_default(text);
        assert_eq!(analysis.confidence, 0);
        assert!(!analysis.has_structured_format);
        assert!(analysis.confidence_details.criteria.iter().all(|c| !c.met));
    }

    #[test]
    fn test_empty_text_scores_zero() {
        let analysis = analyze_default("");
        assert_eq!(analysis.confidence, 0);
        assert_eq!(analysis.confidence_details.max_possible_score, 100);
    }

    #[test]
    fn test_structured_document_scores_high() {
        let text = "=== TRAIL ===\ntitle: Vibe Coding\n=== MODULE ===\ntitle: Intro\ntype: theory\n---\nHello\n=== QUESTIONS ===\nQ: What is X?\n- A*\n- B";
        let analysis = analyze_default(text);
        assert!(analysis.has_trail_markers);
        assert!(analysis.has_module_markers);
        assert!(analysis.has_question_markers);
        assert_eq!(analysis.detected_modules, 1);
        assert!(analysis.confidence > 50, "confidence {}", analysis.confidence);
    }

    #[test]
    fn test_criteria_are_itemized() {
        let text = "=== TRAIL ===\ntitle: T\n=== MODULE ===\n=== MODULE ===\n=== MODULE ===\n=== MODULE ===";
        let analysis = analyze_default(text);
        let module = analysis
            .confidence_details
            .criteria
            .iter()
            .find(|c| c.name == "module_structure")
            .unwrap();
        assert_eq!(module.score, 25);
        assert_eq!(module.max_score, 25);
        assert!(module.met);
        let sum: u32 = analysis.confidence_details.criteria.iter().map(|c| c.score).sum();
        assert_eq!(sum.min(100), analysis.confidence);
    }

    #[test]
    fn test_freeform_cues_are_bounded() {
        let text = "Модуль первый\nтекст\nМодуль второй\nтекст\nУрок №3\nТеоретический материал\nПрактическое задание\nЧто такое Rust? 1) Язык 2) Остров\nКакой цвет? a) красный b) синий";
        let analysis = analyze_default(text);
        let freeform = analysis
            .confidence_details
            .criteria
            .iter()
            .find(|c| c.name == "freeform_cues")
            .unwrap();
        assert_eq!(freeform.score, 15);
        assert!(freeform.description.contains("ordinal_section"));
        assert!(!analysis.has_structured_format);
    }

    #[test]
    fn test_custom_patterns() {
        let mut patterns = StructurePatterns::default();
        patterns.trail_markers = vec![Regex::new(r"^@course").unwrap()];
        let analysis = analyze("@course Rust", &patterns);
        assert!(analysis.has_trail_markers);
        assert_eq!(analysis.confidence_details.criteria[0].score, 20);
    }
}
