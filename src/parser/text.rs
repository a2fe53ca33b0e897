//! Plain-text parser.
//!
//! Documents with explicit `=== TRAIL ===` / `=== MODULE ===` /
//! `=== QUESTIONS ===` markers go through a strict block parser. Everything
//! else, and marker documents the strict parser cannot make sense of, goes
//! through the heading heuristics.

use regex::Regex;
use std::sync::LazyLock;

use super::common::{self, Metadata, first_line_title, parse_meta_line, tidy_content};
use super::normalize::SYNTHETIC_TRAIL_TITLE;
use super::validate;
use crate::analyzer;
use crate::model::{ModuleType, ParseMethod, ParseResult, ParsedModule, ParsedTrail};

/// Structured parsing needs confidence strictly above this.
pub const DEFAULT_STRUCTURED_THRESHOLD: u32 = 50;

pub fn parse(content: &str) -> ParseResult {
    parse_with_threshold(content, DEFAULT_STRUCTURED_THRESHOLD)
}

pub fn parse_with_threshold(content: &str, threshold: u32) -> ParseResult {
    let analysis = analyzer::analyze_default(content);
    let mut fallback_warning = None;

    if analysis.confidence > threshold && analysis.has_structured_format {
        let mut warnings = Vec::new();
        let trails = parse_structured(content, &mut warnings);
        if trails.iter().any(|t| !t.modules.is_empty()) {
            let mut result = ParseResult::from_trails(trails, warnings, ParseMethod::Code);
            result.confidence_details = Some(analysis.confidence_details);
            return result;
        }
        fallback_warning = Some("Section markers found but no modules could be built; using heuristics".to_string());
    }

    let mut result = parse_heuristic(content);
    if let Some(warning) = fallback_warning {
        result.warnings.insert(0, warning);
    }
    result.confidence_details = Some(analysis.confidence_details);
    result
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Marker {
    Trail,
    Module,
    Questions,
}

static BLOCK_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:={2,}\s*(trail|трейл|course|курс|module|модуль|lesson|урок|questions|вопросы|quiz|тест)\s*={2,}|\[(trail|трейл|course|курс|module|модуль|lesson|урок|questions|вопросы|quiz|тест)\])\s*$",
    )
    .unwrap()
});

fn block_marker(line: &str) -> Option<Marker> {
    let caps = BLOCK_MARKER.captures(line)?;
    let word = caps.get(1).or_else(|| caps.get(2))?.as_str().to_lowercase();
    let marker = match word.as_str() {
        "trail" | "трейл" | "course" | "курс" => Marker::Trail,
        "module" | "модуль" | "lesson" | "урок" => Marker::Module,
        _ => Marker::Questions,
    };
    Some(marker)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Block {
    Preamble,
    TrailMeta,
    TrailDescription,
    ModuleMeta,
    ModuleContent,
    Questions,
}

/// A module while its block is still being read.
#[derive(Default)]
struct PendingModule {
    meta: Metadata,
    content: Vec<String>,
    questions: Vec<String>,
}

#[derive(Default)]
struct PendingTrail {
    meta: Metadata,
    description: Vec<String>,
    modules: Vec<ParsedModule>,
}

struct StructuredParser<'w> {
    trails: Vec<ParsedTrail>,
    trail: Option<PendingTrail>,
    module: Option<PendingModule>,
    warnings: &'w mut Vec<String>,
}

impl StructuredParser<'_> {
    fn finish_module(&mut self) {
        let Some(pending) = self.module.take() else {
            return;
        };
        let trail = self.trail.get_or_insert_with(PendingTrail::default);
        let index = trail.modules.len() + 1;

        let mut module = ParsedModule::new(format!("Module {}", index));
        if pending.meta.title.is_none() {
            self.warnings.push(format!("Module {} has no title", index));
        }
        let explicit_type = pending.meta.apply_to_module(&mut module, self.warnings);
        module.content = tidy_content(&pending.content.join("\n"));
        common::attach_questions(&mut module, explicit_type, self.warnings);

        if !pending.questions.is_empty() {
            let extracted = common::extract_questions(&pending.questions.join("\n"));
            if !extracted.content.is_empty() {
                self.warnings.push(format!(
                    "Ignored unrecognized lines in the questions block of '{}'",
                    validate::short(&module.title)
                ));
            }
            self.warnings.extend(extracted.warnings);
            module.questions.extend(extracted.questions);
            if !explicit_type && !module.questions.is_empty() && module.module_type == ModuleType::Theory {
                module.module_type = ModuleType::Practice;
                if pending.meta.points.is_none() {
                    module.points = ModuleType::Practice.default_points();
                }
            }
        }
        trail.modules.push(module);
    }

    fn finish_trail(&mut self) {
        self.finish_module();
        let Some(pending) = self.trail.take() else {
            return;
        };
        let mut trail = ParsedTrail::new(SYNTHETIC_TRAIL_TITLE);
        if pending.meta.title.is_none() {
            self.warnings.push("Trail block has no title".into());
        }
        pending.meta.apply_to_trail(&mut trail);
        if trail.description.is_empty() {
            trail.description = tidy_content(&pending.description.join("\n"));
        }
        trail.modules = pending.modules;
        common::dedupe_module_slugs(&mut trail);
        self.trails.push(trail);
    }
}

/// Block parser for marker documents.
pub fn parse_structured(content: &str, warnings: &mut Vec<String>) -> Vec<ParsedTrail> {
    let mut parser = StructuredParser {
        trails: Vec::new(),
        trail: None,
        module: None,
        warnings,
    };
    let mut block = Block::Preamble;

    for line in content.lines() {
        if let Some(marker) = block_marker(line) {
            match marker {
                Marker::Trail => {
                    parser.finish_trail();
                    parser.trail = Some(PendingTrail::default());
                    block = Block::TrailMeta;
                }
                Marker::Module => {
                    parser.finish_module();
                    if parser.trail.is_none() {
                        parser.warnings.push("Module found before any trail marker; using a synthetic trail".into());
                        parser.trail = Some(PendingTrail::default());
                    }
                    parser.module = Some(PendingModule::default());
                    block = Block::ModuleMeta;
                }
                Marker::Questions => {
                    if parser.module.is_none() {
                        parser.warnings.push("Questions block without a module; creating one".into());
                        parser.module = Some(PendingModule::default());
                    }
                    block = Block::Questions;
                }
            }
            continue;
        }

        let trimmed = line.trim();
        match block {
            Block::Preamble => {}
            Block::TrailMeta => {
                if trimmed == "---" {
                    block = Block::TrailDescription;
                } else if let Some((field, value)) = parse_meta_line(trimmed)
                    && let Some(trail) = parser.trail.as_mut()
                {
                    trail.meta.set(field, value);
                } else if !trimmed.is_empty()
                    && let Some(trail) = parser.trail.as_mut()
                {
                    trail.description.push(line.to_string());
                }
            }
            Block::TrailDescription => {
                if let Some(trail) = parser.trail.as_mut() {
                    trail.description.push(line.to_string());
                }
            }
            Block::ModuleMeta => {
                let Some(module) = parser.module.as_mut() else {
                    continue;
                };
                if trimmed == "---" {
                    block = Block::ModuleContent;
                } else if let Some((field, value)) = parse_meta_line(trimmed) {
                    module.meta.set(field, value);
                } else if !trimmed.is_empty() {
                    // Body text without a `---` separator.
                    module.content.push(line.to_string());
                    block = Block::ModuleContent;
                }
            }
            Block::ModuleContent => {
                if let Some(module) = parser.module.as_mut() {
                    module.content.push(line.to_string());
                }
            }
            Block::Questions => {
                if let Some(module) = parser.module.as_mut() {
                    module.questions.push(line.to_string());
                }
            }
        }
    }
    parser.finish_trail();
    parser.trails
}

#[derive(Debug, Clone, PartialEq)]
pub enum Heading {
    Trail(String),
    Module(String),
}

/// A line and its neighbourhood, as seen by the heading predicates.
pub struct LineContext<'a> {
    pub line: &'a str,
    pub prev_blank: bool,
    pub next: Option<&'a str>,
}

/// A named heading recognizer; the first one that matches wins.
pub struct HeadingRule {
    pub name: &'static str,
    pub detect: fn(&LineContext) -> Option<Heading>,
}

pub static HEADING_RULES: &[HeadingRule] = &[
    HeadingRule {
        name: "markdown_heading",
        detect: markdown_heading,
    },
    HeadingRule {
        name: "trail_keyword",
        detect: trail_keyword,
    },
    HeadingRule {
        name: "module_keyword",
        detect: module_keyword,
    },
    HeadingRule {
        name: "numbered_section",
        detect: numbered_section,
    },
    HeadingRule {
        name: "all_caps",
        detect: all_caps,
    },
];

static MD_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*$").unwrap());
static TRAIL_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:курс|course|трейл|trail)\s*[:\-–—]\s*(\S.*)$").unwrap());
static MODULE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:модуль|module|урок|lesson|занятие|глава|chapter|раздел|section|тема|topic|часть|part)(?:\s*№?\s*\d+\b|\s+(?:первый|первая|второй|вторая|третий|третья|четвертый|четвёртый|пятый|шестой|седьмой|восьмой|девятый|десятый|one|two|three|four|five|six|seven|eight|nine|ten|first|second|third|[ivx]+)\b|\s*[:.\-–—]|\s*$)",
    )
    .unwrap()
});
static NUMBERED_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}\.\s+(\p{Lu}[^.?!;:]{1,80})$").unwrap());
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•+]\s|\d{1,2}[.)]\s|[a-zA-Zа-яА-Я][.)]\s)").unwrap());

fn markdown_heading(ctx: &LineContext) -> Option<Heading> {
    let caps = MD_HEADING.captures(ctx.line)?;
    let title = caps[2].trim().to_string();
    if caps[1].len() == 1 {
        Some(Heading::Trail(title))
    } else {
        Some(Heading::Module(title))
    }
}

fn trail_keyword(ctx: &LineContext) -> Option<Heading> {
    let caps = TRAIL_KEYWORD.captures(ctx.line)?;
    Some(Heading::Trail(caps[1].trim().to_string()))
}

fn module_keyword(ctx: &LineContext) -> Option<Heading> {
    if ctx.line.chars().count() > 120 || ctx.line.ends_with('?') || !MODULE_KEYWORD.is_match(ctx.line) {
        return None;
    }
    Some(Heading::Module(ctx.line.trim_end_matches(':').trim().to_string()))
}

fn numbered_section(ctx: &LineContext) -> Option<Heading> {
    let caps = NUMBERED_SECTION.captures(ctx.line)?;
    // Numbered option lists look the same; a heading stands alone.
    let next_is_item = ctx.next.is_some_and(|n| LIST_ITEM.is_match(n.trim()));
    if !ctx.prev_blank || next_is_item {
        return None;
    }
    Some(Heading::Module(caps[1].trim().to_string()))
}

fn all_caps(ctx: &LineContext) -> Option<Heading> {
    let letters: Vec<char> = ctx.line.chars().filter(|c| c.is_alphabetic()).collect();
    if !ctx.prev_blank
        || letters.len() < 3
        || ctx.line.chars().count() > 60
        || ctx.line.ends_with(['.', '?', '!', ','])
        || !letters.iter().all(|c| c.is_uppercase())
    {
        return None;
    }
    Some(Heading::Module(ctx.line.to_string()))
}

pub fn classify_line(ctx: &LineContext) -> Option<Heading> {
    HEADING_RULES.iter().find_map(|rule| (rule.detect)(ctx))
}

static INLINE_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(\d{1,2}[.)]|[a-hа-з][.)])\s").unwrap());

/// Split `Question? 1) a 2) b` into a question line plus one option per line.
pub fn split_inline_question(line: &str) -> Option<Vec<String>> {
    let end = line.find('?')? + 1;
    let (question, tail) = line.split_at(end);
    let starts: Vec<usize> = INLINE_ANSWER
        .captures_iter(tail)
        .filter_map(|c| c.get(1).map(|m| m.start()))
        .collect();
    if starts.len() < 2 || !tail[..starts[0]].trim().is_empty() {
        return None;
    }
    let mut lines = vec![question.trim().to_string()];
    for (i, start) in starts.iter().enumerate() {
        let stop = starts.get(i + 1).copied().unwrap_or(tail.len());
        let option = tail[*start..stop].trim();
        if !option.is_empty() {
            lines.push(option.to_string());
        }
    }
    Some(lines)
}

fn normalize_inline_questions(content: &str) -> String {
    content
        .lines()
        .flat_map(|line| split_inline_question(line).unwrap_or_else(|| vec![line.to_string()]))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Heading-inference parser for documents without explicit markers. Always
/// yields at least one trail when the text is not blank.
pub fn parse_heuristic(content: &str) -> ParseResult {
    let mut warnings = Vec::new();
    let normalized = normalize_inline_questions(content);
    let lines: Vec<&str> = normalized.lines().map(str::trim_end).collect();

    let mut trails: Vec<ParsedTrail> = Vec::new();
    let mut preamble: Vec<&str> = Vec::new();
    let mut current: Option<(ParsedModule, Vec<&str>)> = None;

    for (idx, &line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        let heading = if trimmed.is_empty() {
            None
        } else {
            let ctx = LineContext {
                line: trimmed,
                prev_blank: idx == 0 || lines[idx - 1].trim().is_empty(),
                next: lines[idx + 1..].iter().map(|l| l.trim()).find(|l| !l.is_empty()),
            };
            classify_line(&ctx)
        };

        match heading {
            Some(Heading::Trail(title)) => {
                finish_module(&mut trails, &mut current, &mut preamble);
                if trails.is_empty() && !preamble.iter().all(|l| l.trim().is_empty()) {
                    trails.push(trail_from_preamble(&mut preamble));
                }
                preamble.clear();
                trails.push(ParsedTrail::new(title));
            }
            Some(Heading::Module(title)) => {
                finish_module(&mut trails, &mut current, &mut preamble);
                current = Some((ParsedModule::new(title), Vec::new()));
            }
            None => match current.as_mut() {
                Some((_, body)) => body.push(line),
                None => match trails.last_mut() {
                    // Text between a trail heading and its first module.
                    Some(trail) if !trimmed.is_empty() => {
                        if !trail.description.is_empty() {
                            trail.description.push('\n');
                        }
                        trail.description.push_str(trimmed);
                    }
                    Some(_) => {}
                    None => preamble.push(line),
                },
            },
        }
    }
    finish_module(&mut trails, &mut current, &mut preamble);

    // Trails whose text never reached a module heading.
    for trail in &mut trails {
        if trail.modules.is_empty() && !trail.description.is_empty() {
            let mut module = ParsedModule::new(trail.title.clone());
            module.content = std::mem::take(&mut trail.description);
            trail.modules.push(module);
        }
    }
    trails.retain(|t| !t.modules.is_empty());

    if trails.is_empty() {
        let text = tidy_content(&normalized);
        if text.is_empty() {
            return ParseResult::from_trails(Vec::new(), warnings, ParseMethod::Code);
        }
        warnings.push("No section structure found; imported the whole text as a single module".into());
        let title = first_line_title(&text).unwrap_or_else(|| SYNTHETIC_TRAIL_TITLE.to_string());
        let mut trail = ParsedTrail::new(title.clone());
        let mut module = ParsedModule::new(title);
        module.content = text;
        trail.modules.push(module);
        trails.push(trail);
    }

    for trail in &mut trails {
        for module in &mut trail.modules {
            common::attach_questions(module, false, &mut warnings);
        }
        common::dedupe_module_slugs(trail);
    }
    ParseResult::from_trails(trails, warnings, ParseMethod::Code)
}

fn finish_module<'a>(
    trails: &mut Vec<ParsedTrail>,
    current: &mut Option<(ParsedModule, Vec<&'a str>)>,
    preamble: &mut Vec<&'a str>,
) {
    let Some((mut module, body)) = current.take() else {
        return;
    };
    module.content = tidy_content(&body.join("\n"));
    if trails.is_empty() {
        trails.push(trail_from_preamble(preamble));
    }
    if let Some(trail) = trails.last_mut() {
        trail.modules.push(module);
    }
}

/// Trail for modules that appear before any trail heading: the first short
/// preamble line names it, the rest describes it.
fn trail_from_preamble(preamble: &mut Vec<&str>) -> ParsedTrail {
    let text = tidy_content(&preamble.join("\n"));
    preamble.clear();
    let mut lines = text.lines();
    match lines.next() {
        Some(first) if first.chars().count() <= 100 => {
            let mut trail = ParsedTrail::new(first.trim_start_matches('#').trim());
            trail.description = tidy_content(&lines.collect::<Vec<_>>().join("\n"));
            trail
        }
        Some(_) => {
            let mut trail = ParsedTrail::new(SYNTHETIC_TRAIL_TITLE);
            trail.description = text;
            trail
        }
        None => ParsedTrail::new(SYNTHETIC_TRAIL_TITLE),
    }
}
