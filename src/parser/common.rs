//! Helpers shared by all deterministic parsers: slugs, `key: value`
//! metadata lines and the embedded-quiz extractor.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::aliases::Field;
use super::validate::{self, coerce_question_type, looks_like_pairs};
use crate::model::{
    CaseAnalysisData, CaseOption, ModuleType, ParsedModule, ParsedQuestion, ParsedTrail, QuestionData,
    QuestionType,
};

fn transliterate_char(c: char) -> Option<&'static str> {
    let s = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' | 'э' | 'є' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' | 'і' => "i",
        'й' => "y",
        'ї' => "yi",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "sch",
        'ъ' | 'ь' => "",
        'ы' => "y",
        'ю' => "yu",
        'я' => "ya",
        'ґ' => "g",
        _ => return None,
    };
    Some(s)
}

/// URL-safe slug; Cyrillic is transliterated to Latin.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if let Some(latin) = transliterate_char(c) {
            slug.push_str(latin);
        } else if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let mut slug: String = slug.chars().take(80).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Append `-2`, `-3`, ... until `slug` is not in `taken`; records the result.
pub fn unique_slug(slug: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(slug.to_string()) {
        return slug.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", slug, n);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Module slugs must be unique inside their trail.
pub fn dedupe_module_slugs(trail: &mut ParsedTrail) {
    let mut taken = HashSet::new();
    for module in &mut trail.modules {
        if module.slug.trim().is_empty() {
            module.slug = slugify(&module.title);
        }
        module.slug = unique_slug(&module.slug, &mut taken);
    }
}

static META_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([\p{L}_][\p{L}\p{N}_ ]{0,30}?)\s*[:=]\s*(.*?)\s*$").unwrap());

/// Recognize a `key: value` metadata line whose key is a known field alias.
pub fn parse_meta_line(line: &str) -> Option<(Field, String)> {
    let caps = META_LINE.captures(line)?;
    let field = Field::metadata_from_key(&caps[1])?;
    Some((field, caps[2].to_string()))
}

/// Metadata collected from `key: value` lines, frontmatter or comments.
#[derive(Debug, Default, Clone)]
pub struct Metadata {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub module_type: Option<String>,
    pub points: Option<String>,
    pub level: Option<String>,
    pub duration: Option<String>,
    pub requires_submission: Option<String>,
}

impl Metadata {
    pub fn set(&mut self, field: Field, value: String) {
        let value = value.trim().trim_matches('"').trim().to_string();
        if value.is_empty() {
            return;
        }
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Slug => &mut self.slug,
            Field::Subtitle => &mut self.subtitle,
            Field::Description => &mut self.description,
            Field::Icon => &mut self.icon,
            Field::Color => &mut self.color,
            Field::Type => &mut self.module_type,
            Field::Points => &mut self.points,
            Field::Level => &mut self.level,
            Field::Duration => &mut self.duration,
            Field::RequiresSubmission => &mut self.requires_submission,
            _ => return,
        };
        *slot = Some(value);
    }

    /// Read every metadata line of a block (frontmatter, comment body). A line
    /// may carry several pairs separated by `,` or `;`.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut meta = Metadata::default();
        for line in lines {
            let pieces: Vec<&str> = line
                .split([',', ';'])
                .filter(|p| !p.trim().is_empty())
                .collect();
            let pairs: Vec<(Field, String)> =
                pieces.iter().filter_map(|p| parse_meta_line(p)).collect();
            if pairs.len() > 1 && pairs.len() == pieces.len() {
                for (field, value) in pairs {
                    meta.set(field, value);
                }
            } else if let Some((field, value)) = parse_meta_line(line) {
                meta.set(field, value);
            }
        }
        meta
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.slug.is_none()
            && self.subtitle.is_none()
            && self.description.is_none()
            && self.icon.is_none()
            && self.color.is_none()
            && self.module_type.is_none()
            && self.points.is_none()
            && self.level.is_none()
            && self.duration.is_none()
            && self.requires_submission.is_none()
    }

    pub fn apply_to_trail(&self, trail: &mut ParsedTrail) {
        if let Some(title) = &self.title {
            trail.title = title.clone();
            trail.slug = slugify(title);
        }
        if let Some(slug) = &self.slug {
            trail.slug = slugify(slug);
        }
        if let Some(subtitle) = &self.subtitle {
            trail.subtitle = subtitle.clone();
        }
        if let Some(description) = &self.description {
            trail.description = description.clone();
        }
        if self.icon.is_some() {
            trail.icon = validate::normalize_icon(self.icon.as_deref());
        }
        if self.color.is_some() {
            trail.color = validate::normalize_color(self.color.as_deref());
        }
    }

    /// Apply module-level fields; returns true when the type was set explicitly.
    pub fn apply_to_module(&self, module: &mut ParsedModule, warnings: &mut Vec<String>) -> bool {
        if let Some(title) = &self.title {
            module.title = title.clone();
            module.slug = slugify(title);
        }
        if let Some(slug) = &self.slug {
            module.slug = slugify(slug);
        }
        if let Some(description) = &self.description {
            module.description = description.clone();
        }
        let explicit_type = self.module_type.is_some();
        if explicit_type {
            module.module_type = validate::module_type_or_default(self.module_type.as_deref(), warnings);
        }
        let points = self
            .points
            .as_ref()
            .map(|p| serde_json::Value::String(p.clone()));
        module.points = validate::coerce_points(points.as_ref(), module.module_type);
        if let Some(level) = &self.level {
            module.level = Some(level.clone());
        }
        if let Some(duration) = &self.duration {
            module.duration = Some(duration.clone());
        }
        if let Some(flag) = &self.requires_submission {
            module.requires_submission =
                super::aliases::truthy(&serde_json::Value::String(flag.clone()));
        }
        explicit_type
    }
}

static QUESTION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:#{1,6}\s*)?(?:\*\*)?(?:q|в|вопрос|question)\s*№?\s*\d*\s*[:.)]\s*(.+?)(?:\*\*)?$").unwrap()
});
static NUMBERED_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:#{1,6}\s*)?(?:\*\*)?\d{1,3}[.)]\s*(.+\?)(?:\*\*)?$").unwrap());
static CHECKBOX_OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•+]\s+)?\[([ xX✓✔])\]\s*(.+)$").unwrap());
static OPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*•+]|[a-zA-Zа-яА-ЯёЁ][.)]|\d{1,2}[.)])\s+(.+)$").unwrap()
});
static CORRECT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\((?:correct|right|правильный|правильно|верно|верный|true)\)\s*").unwrap()
});
static ANSWER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:correct answer|answer|правильный ответ|ответ)\s*[:\-–]\s*(.+)$").unwrap()
});
static EXPLANATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:explanation|пояснение|объяснение)\s*[:\-–]\s*(.+)$").unwrap()
});
static TYPE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:type|тип)\s*:\s*(\S.*)$").unwrap());

/// Question text if the line opens a quiz question.
pub fn question_text(line: &str) -> Option<String> {
    let line = line.trim();
    if let Some(caps) = QUESTION_PREFIX.captures(line) {
        return Some(caps[1].trim().to_string());
    }
    if let Some(caps) = NUMBERED_QUESTION.captures(line) {
        return Some(caps[1].trim().to_string());
    }
    let stripped = line.trim_start_matches('#').trim().trim_matches('*').trim();
    if stripped.ends_with('?') && stripped.chars().count() >= 3 && !OPTION_LINE.is_match(line) {
        return Some(stripped.to_string());
    }
    None
}

/// An answer option with its correctness marker removed.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionLine {
    pub text: String,
    pub correct: bool,
}

pub fn option_line(line: &str) -> Option<OptionLine> {
    let line = line.trim();
    if let Some(caps) = CHECKBOX_OPTION.captures(line) {
        let (text, marked) = strip_correct_markers(&caps[2]);
        return Some(OptionLine {
            text,
            correct: &caps[1] != " " || marked,
        });
    }
    let caps = OPTION_LINE.captures(line)?;
    let (text, correct) = strip_correct_markers(&caps[1]);
    (!text.is_empty()).then_some(OptionLine { text, correct })
}

/// Remove `*`, `(correct)`, `✓` style markers; reports whether any was present.
pub fn strip_correct_markers(raw: &str) -> (String, bool) {
    let mut text = raw.trim().to_string();
    let mut correct = false;
    if CORRECT_TAG.is_match(&text) {
        correct = true;
        text = CORRECT_TAG.replace_all(&text, " ").trim().to_string();
    }
    if text.contains(['✓', '✔']) {
        correct = true;
        text = text.replace(['✓', '✔'], "").trim().to_string();
    }
    let bold = text.starts_with("**") && text.ends_with("**") && text.len() > 4;
    if text.ends_with('*') && !bold {
        correct = true;
        text = text.trim_end_matches('*').trim().to_string();
    }
    (text, correct)
}

fn answer_index(answer: &str, options: &[OptionLine]) -> Option<usize> {
    let answer = answer.trim().trim_end_matches(['.', ')']);
    if let Ok(n) = answer.parse::<usize>() {
        return (n >= 1 && n <= options.len()).then(|| n - 1);
    }
    let mut chars = answer.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        let lower = c.to_lowercase().next().unwrap_or(c);
        let idx = if lower.is_ascii_lowercase() {
            Some(lower as usize - 'a' as usize)
        } else {
            "абвгдежз".chars().position(|x| x == lower)
        };
        if let Some(idx) = idx
            && idx < options.len()
        {
            return Some(idx);
        }
    }
    options
        .iter()
        .position(|o| o.text.eq_ignore_ascii_case(answer) || o.text.to_lowercase() == answer.to_lowercase())
}

/// Result of scanning free text for embedded quiz blocks.
#[derive(Debug, Default)]
pub struct ExtractedQuestions {
    /// The text with every recognized question block removed.
    pub content: String,
    pub questions: Vec<ParsedQuestion>,
    pub warnings: Vec<String>,
}

/// Pull `question? + option block` groups out of free text.
pub fn extract_questions(text: &str) -> ExtractedQuestions {
    let lines: Vec<&str> = text.lines().collect();
    let mut out = ExtractedQuestions::default();
    let mut kept: Vec<&str> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(question) = question_text(lines[i]) else {
            kept.push(lines[i]);
            i += 1;
            continue;
        };

        let mut j = i + 1;
        let mut declared_type = None;
        let mut options: Vec<OptionLine> = Vec::new();
        let mut answer = None;
        let mut explanation = None;

        while j < lines.len() {
            let line = lines[j].trim();
            if line.is_empty() {
                // A blank line ends the block once options started, unless
                // an answer/explanation line follows it.
                let next = lines[j + 1..].iter().map(|l| l.trim()).find(|l| !l.is_empty());
                let continues = next.is_some_and(|n| {
                    (options.is_empty() && option_line(n).is_some())
                        || ANSWER_LINE.is_match(n)
                        || EXPLANATION_LINE.is_match(n)
                });
                if !options.is_empty() && !continues {
                    break;
                }
                if options.is_empty() && declared_type.is_none() && !continues {
                    break;
                }
                j += 1;
                continue;
            }
            if options.is_empty()
                && let Some(caps) = TYPE_LINE.captures(line)
            {
                declared_type = Some(coerce_question_type(&caps[1]));
                j += 1;
                continue;
            }
            if let Some(caps) = ANSWER_LINE.captures(line)
                && !options.is_empty()
            {
                answer = Some(caps[1].trim().to_string());
                j += 1;
                continue;
            }
            if let Some(caps) = EXPLANATION_LINE.captures(line) {
                explanation = Some(caps[1].trim().to_string());
                j += 1;
                continue;
            }
            if answer.is_none()
                && explanation.is_none()
                && question_text(line).is_none()
                && let Some(option) = option_line(line)
            {
                options.push(option);
                j += 1;
                continue;
            }
            break;
        }

        if options.len() < 2 {
            kept.push(lines[i]);
            i += 1;
            continue;
        }

        let option_texts: Vec<String> = options.iter().map(|o| o.text.clone()).collect();
        let question_type = declared_type.unwrap_or(if looks_like_pairs(&option_texts) {
            QuestionType::Matching
        } else {
            QuestionType::SingleChoice
        });

        let marked = options.iter().position(|o| o.correct);
        let correct = answer
            .as_deref()
            .and_then(|a| answer_index(a, &options))
            .or(marked);
        if correct.is_none() && question_type == QuestionType::SingleChoice {
            out.warnings.push(format!(
                "Question '{}' has no marked correct answer; using the first option",
                validate::short(&question)
            ));
        }

        let mut parsed = ParsedQuestion {
            question: question.clone(),
            question_type,
            options: option_texts,
            correct_answer: correct.unwrap_or(0),
            data: None,
            explanation,
        };
        if question_type == QuestionType::CaseAnalysis {
            let case_options: Vec<CaseOption> = options
                .iter()
                .enumerate()
                .map(|(idx, o)| CaseOption {
                    id: format!("o{}", idx + 1),
                    text: o.text.clone(),
                    is_correct: o.correct || Some(idx) == correct,
                    explanation: None,
                })
                .collect();
            parsed.data = Some(QuestionData::CaseAnalysis(CaseAnalysisData {
                case_content: question,
                options: case_options,
                min_correct_required: 0,
            }));
        }
        if let Some(q) = validate::finalize_question(parsed, &mut out.warnings) {
            out.questions.push(q);
        }
        i = j;
    }

    out.content = tidy_content(&kept.join("\n"));
    out
}

/// Attach extracted questions; untyped modules with questions become PRACTICE.
pub fn attach_questions(module: &mut ParsedModule, explicit_type: bool, warnings: &mut Vec<String>) {
    let extracted = extract_questions(&module.content);
    if extracted.questions.is_empty() {
        return;
    }
    module.content = extracted.content;
    module.questions.extend(extracted.questions);
    warnings.extend(extracted.warnings);
    if !explicit_type && module.module_type == ModuleType::Theory {
        module.module_type = ModuleType::Practice;
        module.points = ModuleType::Practice.default_points();
    }
}

/// Trim, collapse runs of 3+ blank lines.
pub fn tidy_content(text: &str) -> String {
    let mut out = String::new();
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// First non-empty line, shortened to something usable as a title.
pub fn first_line_title(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_start_matches('#').trim();
    let title: String = line.chars().take(100).collect();
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_transliterates() {
        assert_eq!(slugify("Вайб Кодинг"), "vayb-koding");
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  ---  "), "untitled");
        assert_eq!(slugify("Модуль 1: Щи и борщ"), "modul-1-schi-i-borsch");
    }

    #[test]
    fn test_slugify_length_cap() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= 80);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_unique_slug() {
        let mut taken = HashSet::new();
        assert_eq!(unique_slug("intro", &mut taken), "intro");
        assert_eq!(unique_slug("intro", &mut taken), "intro-2");
        assert_eq!(unique_slug("intro", &mut taken), "intro-3");
    }

    #[test]
    fn test_meta_line() {
        assert_eq!(parse_meta_line("title: Vibe Coding"), Some((Field::Title, "Vibe Coding".into())));
        assert_eq!(parse_meta_line("Тип: практика"), Some((Field::Type, "практика".into())));
        assert_eq!(parse_meta_line("Note: something"), None);
    }

    #[test]
    fn test_metadata_from_comment_line() {
        let meta = Metadata::from_lines(["type: practice, points: 80", "description: A, B and C"]);
        assert_eq!(meta.module_type.as_deref(), Some("practice"));
        assert_eq!(meta.points.as_deref(), Some("80"));
        assert_eq!(meta.description.as_deref(), Some("A, B and C"));
    }

    #[test]
    fn test_strip_correct_markers() {
        assert_eq!(strip_correct_markers("A*"), ("A".into(), true));
        assert_eq!(strip_correct_markers("Paris (correct)"), ("Paris".into(), true));
        assert_eq!(strip_correct_markers("Москва (правильный)"), ("Москва".into(), true));
        assert_eq!(strip_correct_markers("Yes ✓"), ("Yes".into(), true));
        assert_eq!(strip_correct_markers("**bold**"), ("**bold**".into(), false));
        assert_eq!(strip_correct_markers("plain"), ("plain".into(), false));
    }

    #[test]
    fn test_extract_simple_question() {
        let text = "Intro text.\n\nQ: What is X?\n- A*\n- B\n\nOutro.";
        let out = extract_questions(text);
        assert_eq!(out.questions.len(), 1);
        let q = &out.questions[0];
        assert_eq!(q.question, "What is X?");
        assert_eq!(q.options, vec!["A", "B"]);
        assert_eq!(q.correct_answer, 0);
        assert_eq!(out.content, "Intro text.\n\nOutro.");
    }

    #[test]
    fn test_extract_checkbox_and_answer_line() {
        let text = "Какой язык компилируемый?\n- [ ] Python\n- [x] Rust\n\n2. Which is faster?\na) Walking\nb) Flying\nAnswer: b\nExplanation: wings";
        let out = extract_questions(text);
        assert_eq!(out.questions.len(), 2);
        assert_eq!(out.questions[0].correct_answer, 1);
        assert_eq!(out.questions[1].question, "Which is faster?");
        assert_eq!(out.questions[1].correct_answer, 1);
        assert_eq!(out.questions[1].explanation.as_deref(), Some("wings"));
    }

    #[test]
    fn test_question_without_marker_warns() {
        let out = extract_questions("Pick one?\n- a\n- b");
        assert_eq!(out.questions.len(), 1);
        assert_eq!(out.questions[0].correct_answer, 0);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_rhetorical_question_is_kept_as_content() {
        let out = extract_questions("Why learn Rust?\nBecause it is fast.");
        assert!(out.questions.is_empty());
        assert!(out.content.contains("Why learn Rust?"));
    }

    #[test]
    fn test_matching_inferred_from_arrows() {
        let out = extract_questions("Match the metrics?\n- CTR -> AI\n- CPC -> AI\n- ROI -> Developer");
        assert_eq!(out.questions.len(), 1);
        assert_eq!(out.questions[0].question_type, QuestionType::Matching);
    }

    #[test]
    fn test_declared_ordering_type() {
        let out = extract_questions("Q: Order the steps\ntype: ordering\n1. Plan\n2. Build\n3. Ship");
        assert_eq!(out.questions.len(), 1);
        assert_eq!(out.questions[0].question_type, QuestionType::Ordering);
    }

    #[test]
    fn test_attach_questions_reclassifies_untyped_module() {
        let mut module = ParsedModule::new("Quiz");
        module.content = "Q: Pick?\n- a*\n- b".into();
        let mut warnings = vec![];
        attach_questions(&mut module, false, &mut warnings);
        assert_eq!(module.module_type, ModuleType::Practice);
        assert_eq!(module.points, 75);

        let mut typed = ParsedModule::new("Typed");
        typed.content = "Q: Pick?\n- a*\n- b".into();
        attach_questions(&mut typed, true, &mut warnings);
        assert_eq!(typed.module_type, ModuleType::Theory);
        assert_eq!(typed.questions.len(), 1);
    }
}
