//! Markdown parser: the heading tree becomes trails and modules.
//!
//! H1 sections are trails and their direct child sections are modules.
//! Deeper sections are folded back into the module body, except quiz
//! sections ("Questions", "Тест", ...) whose options become questions.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::LazyLock;

use super::common::{self, Metadata, tidy_content};
use super::normalize::SYNTHETIC_TRAIL_TITLE;
use super::text;
use crate::model::{ModuleType, ParseMethod, ParseResult, ParsedModule, ParsedTrail};

static QUIZ_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:questions|quiz|test|self-check|вопросы|тест|тестирование|проверка знаний|контрольные вопросы)\b")
        .unwrap()
});

#[derive(Debug, Clone)]
struct Section {
    level: usize,
    title: String,
    /// Text between this heading and the next one.
    body: String,
}

/// Split off YAML frontmatter or a leading `<!-- -->` block.
fn leading_metadata(content: &str) -> (Metadata, &str) {
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();
    if let Some(rest) = trimmed.strip_prefix("---\n").or_else(|| trimmed.strip_prefix("---\r\n")) {
        if let Some(end) = rest.find("\n---") {
            let block = &rest[..end];
            let after = &rest[end + 4..];
            let after = after.split_once('\n').map_or("", |(_, tail)| tail);
            return (Metadata::from_lines(block.lines()), after);
        }
    }
    if let Some((meta, rest)) = comment_metadata(trimmed) {
        return (meta, rest);
    }
    (Metadata::default(), trimmed)
}

/// `<!-- key: value ... -->` at the start of `text`; `None` when the comment
/// carries no metadata.
fn comment_metadata(text: &str) -> Option<(Metadata, &str)> {
    let inner = text.trim_start().strip_prefix("<!--")?;
    let end = inner.find("-->")?;
    let meta = Metadata::from_lines(inner[..end].lines());
    if meta.is_empty() {
        return None;
    }
    Some((meta, &inner[end + 3..]))
}

fn sections(content: &str) -> (String, Vec<Section>) {
    let mut headings: Vec<(usize, String, usize, usize)> = Vec::new();
    let mut current: Option<(usize, String, usize)> = None;

    let options = Options::ENABLE_TABLES | Options::ENABLE_TASKLISTS;
    for (event, range) in Parser::new_ext(content, options).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some((level as usize, String::new(), range.start));
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, title, _)) = current.as_mut() {
                    title.push_str(&t);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, title, start)) = current.take() {
                    headings.push((level, title.trim().to_string(), start, range.end));
                }
            }
            _ => {}
        }
    }

    let preamble = headings
        .first()
        .map_or(content, |(_, _, start, _)| &content[..*start])
        .to_string();
    let sections = headings
        .iter()
        .enumerate()
        .map(|(i, (level, title, _, end))| {
            let stop = headings.get(i + 1).map_or(content.len(), |next| next.2);
            Section {
                level: *level,
                title: title.clone(),
                body: content[*end..stop].to_string(),
            }
        })
        .collect();
    (preamble, sections)
}

/// A module being assembled from its section and the deeper ones below it.
struct ModuleBuilder {
    module: ParsedModule,
    explicit_type: bool,
    body: Vec<String>,
    quiz: Vec<String>,
}

impl ModuleBuilder {
    fn new(section: &Section, warnings: &mut Vec<String>) -> Self {
        let mut module = ParsedModule::new(section.title.clone());
        let mut explicit_type = false;
        let mut body = section.body.as_str();
        if let Some((meta, rest)) = comment_metadata(body) {
            explicit_type = meta.apply_to_module(&mut module, warnings);
            body = rest;
        }
        let mut builder = Self {
            module,
            explicit_type,
            body: vec![body.to_string()],
            quiz: Vec::new(),
        };
        if QUIZ_TITLE.is_match(&section.title) {
            builder.quiz.push(section.body.clone());
            builder.body.clear();
        }
        builder
    }

    fn add_subsection(&mut self, section: &Section) {
        if QUIZ_TITLE.is_match(&section.title) {
            self.quiz.push(section.body.clone());
        } else {
            self.body
                .push(format!("{} {}\n{}", "#".repeat(section.level), section.title, section.body));
        }
    }

    fn finish(mut self, warnings: &mut Vec<String>) -> ParsedModule {
        self.module.content = tidy_content(&self.body.join("\n"));
        common::attach_questions(&mut self.module, self.explicit_type, warnings);
        for block in &self.quiz {
            let extracted = common::extract_questions(block);
            warnings.extend(extracted.warnings);
            if !extracted.content.is_empty() {
                if !self.module.content.is_empty() {
                    self.module.content.push_str("\n\n");
                }
                self.module.content.push_str(&extracted.content);
            }
            self.module.questions.extend(extracted.questions);
        }
        if !self.explicit_type && !self.module.questions.is_empty() && self.module.module_type == ModuleType::Theory {
            self.module.module_type = ModuleType::Practice;
            self.module.points = ModuleType::Practice.default_points();
        }
        self.module
    }
}

struct TrailBuilder {
    trail: ParsedTrail,
    /// Level of this trail's direct children, fixed by the first one.
    module_level: Option<usize>,
    description: Vec<String>,
    module: Option<ModuleBuilder>,
}

impl TrailBuilder {
    fn new(title: &str) -> Self {
        Self {
            trail: ParsedTrail::new(title),
            module_level: None,
            description: Vec::new(),
            module: None,
        }
    }

    fn add(&mut self, section: &Section, warnings: &mut Vec<String>) {
        let level = *self.module_level.get_or_insert(section.level);
        match self.module.as_mut() {
            Some(module) if section.level > level => module.add_subsection(section),
            _ => {
                self.flush_module(warnings);
                self.module = Some(ModuleBuilder::new(section, warnings));
            }
        }
    }

    fn flush_module(&mut self, warnings: &mut Vec<String>) {
        if let Some(builder) = self.module.take() {
            self.trail.modules.push(builder.finish(warnings));
        }
    }

    fn finish(mut self, warnings: &mut Vec<String>) -> ParsedTrail {
        self.flush_module(warnings);
        let description = tidy_content(&self.description.join("\n"));
        if self.trail.modules.is_empty() {
            if !description.is_empty() {
                // A lone H1 with text is a one-lesson course.
                let mut module = ParsedModule::new(self.trail.title.clone());
                module.content = description;
                common::attach_questions(&mut module, false, warnings);
                self.trail.modules.push(module);
            }
        } else if self.trail.description.is_empty() {
            self.trail.description = description;
        }
        common::dedupe_module_slugs(&mut self.trail);
        self.trail
    }
}

pub fn parse(content: &str) -> ParseResult {
    let mut warnings = Vec::new();
    let (front, body) = leading_metadata(content);
    let (preamble, sections) = sections(body);

    if sections.is_empty() {
        let mut result = text::parse_heuristic(body);
        if let Some(trail) = result.trails.first_mut() {
            front.apply_to_trail(trail);
        }
        return result;
    }

    let has_h1 = sections.iter().any(|s| s.level == 1);
    let mut trails: Vec<ParsedTrail> = Vec::new();
    let mut current: Option<TrailBuilder> = None;

    if !has_h1 {
        let title = front.title.clone().unwrap_or_else(|| SYNTHETIC_TRAIL_TITLE.to_string());
        let mut builder = TrailBuilder::new(&title);
        builder.description.push(preamble.clone());
        current = Some(builder);
    }

    // Sections above the first H1 have no trail yet.
    let mut leading: Vec<&Section> = Vec::new();
    for section in &sections {
        if section.level == 1 {
            if let Some(builder) = current.take() {
                trails.push(builder.finish(&mut warnings));
            }
            let mut builder = TrailBuilder::new(&section.title);
            let mut body = section.body.as_str();
            if let Some((meta, rest)) = comment_metadata(body) {
                meta.apply_to_trail(&mut builder.trail);
                body = rest;
            }
            if trails.is_empty() && !preamble.trim().is_empty() {
                builder.description.push(preamble.clone());
            }
            builder.description.push(body.to_string());
            if !leading.is_empty() {
                warnings.push(format!(
                    "{} section(s) before the first top-level heading were added to '{}'",
                    leading.len(),
                    section.title
                ));
                for orphan in leading.drain(..) {
                    builder.add(orphan, &mut warnings);
                }
            }
            current = Some(builder);
        } else if let Some(builder) = current.as_mut() {
            builder.add(section, &mut warnings);
        } else {
            leading.push(section);
        }
    }
    if let Some(builder) = current.take() {
        trails.push(builder.finish(&mut warnings));
    }

    let (kept, empty): (Vec<ParsedTrail>, Vec<ParsedTrail>) =
        trails.into_iter().partition(|t| !t.modules.is_empty());
    let mut trails = kept;
    if trails.is_empty() && !empty.is_empty() {
        // Headings only: keep them as lessons rather than lose the document.
        let title = front.title.clone().unwrap_or_else(|| empty[0].title.clone());
        let mut trail = ParsedTrail::new(&title);
        trail.modules = empty.iter().map(|t| ParsedModule::new(t.title.clone())).collect();
        common::dedupe_module_slugs(&mut trail);
        warnings.push("No lesson content under the headings; each heading became a module".into());
        trails.push(trail);
    } else {
        for skipped in &empty {
            warnings.push(format!("Skipped top-level heading '{}' with no content", skipped.title));
        }
    }
    if let Some(first) = trails.first_mut()
        && !front.is_empty()
    {
        front.apply_to_trail(first);
    }
    if !has_h1 && front.title.is_none() {
        warnings.push("No top-level heading; modules placed in a synthetic trail".into());
    }
    ParseResult::from_trails(trails, warnings, ParseMethod::Code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionType;

    #[test]
    fn test_heading_tree() {
        let md = "# Rust Course\n\nLearn Rust.\n\n## Ownership\n\nMoves.\n\n### Borrowing\n\nRefs.\n\n## Traits\n\nShared behaviour.";
        let result = parse(md);
        assert!(result.success);
        let trail = &result.trails[0];
        assert_eq!(trail.title, "Rust Course");
        assert_eq!(trail.description, "Learn Rust.");
        assert_eq!(trail.modules.len(), 2);
        assert!(trail.modules[0].content.contains("### Borrowing"));
        assert!(trail.modules[0].content.contains("Refs."));
        assert_eq!(trail.modules[1].title, "Traits");
    }

    #[test]
    fn test_several_trails() {
        let md = "# One\n## A\ntext\n# Two\n## B\ntext\n## C\ntext";
        let result = parse(md);
        assert_eq!(result.trails.len(), 2);
        assert_eq!(result.trails[1].modules.len(), 2);
    }

    #[test]
    fn test_quiz_subsection_becomes_questions() {
        let md = "# Course\n## Basics\nSome theory.\n### Вопросы\nЧто такое Rust?\n- Язык*\n- Остров\n";
        let result = parse(md);
        let module = &result.trails[0].modules[0];
        assert_eq!(module.content, "Some theory.");
        assert_eq!(module.questions.len(), 1);
        assert_eq!(module.questions[0].question_type, QuestionType::SingleChoice);
        assert_eq!(module.module_type, ModuleType::Practice);
    }

    #[test]
    fn test_frontmatter_and_module_comment() {
        let md = "---\ntitle: From Frontmatter\ncolor: #FF0000\n---\n# Heading Title\n## Lab\n<!-- type: project, points: 120 -->\nBuild it.\n";
        let result = parse(md);
        let trail = &result.trails[0];
        assert_eq!(trail.title, "From Frontmatter");
        assert_eq!(trail.color, "#ff0000");
        let module = &trail.modules[0];
        assert_eq!(module.module_type, ModuleType::Project);
        assert_eq!(module.points, 120);
        assert_eq!(module.content, "Build it.");
    }

    #[test]
    fn test_headings_in_code_blocks_are_ignored() {
        let md = "# Course\n## Shell\n```bash\n# not a heading\necho hi\n```\n";
        let result = parse(md);
        assert_eq!(result.trails[0].modules.len(), 1);
        assert!(result.trails[0].modules[0].content.contains("# not a heading"));
    }

    #[test]
    fn test_no_h1_uses_synthetic_trail() {
        let result = parse("## First\ntext\n## Second\ntext");
        assert_eq!(result.trails.len(), 1);
        assert_eq!(result.trails[0].title, SYNTHETIC_TRAIL_TITLE);
        assert_eq!(result.trails[0].modules.len(), 2);
    }

    #[test]
    fn test_sections_above_first_h1_join_first_trail() {
        let md = "## Intro\n\nImportant body text.\n\n# Course\n\n## Lesson\n\nBody.";
        let result = parse(md);
        assert!(result.success);
        assert_eq!(result.trails.len(), 1);
        let titles: Vec<&str> = result.trails[0].modules.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Intro", "Lesson"]);
        assert_eq!(result.trails[0].modules[0].content, "Important body text.");
        assert!(result.warnings.iter().any(|w| w.contains("before the first top-level heading")));
    }

    #[test]
    fn test_heading_only_document_keeps_heading_as_module() {
        let result = parse("# Only A Title");
        assert!(result.success);
        assert_eq!(result.trails.len(), 1);
        assert_eq!(result.trails[0].title, "Only A Title");
        assert_eq!(result.trails[0].modules.len(), 1);
        assert_eq!(result.trails[0].modules[0].title, "Only A Title");
    }

    #[test]
    fn test_empty_h1_next_to_real_trail_is_skipped() {
        let result = parse("# Placeholder\n# Course\n## Lesson\nBody.");
        assert_eq!(result.trails.len(), 1);
        assert_eq!(result.trails[0].title, "Course");
        assert!(result.warnings.iter().any(|w| w.contains("'Placeholder'")));
    }

    #[test]
    fn test_no_headings_falls_back_to_text() {
        let result = parse("Модуль 1: Старт\nТекст\n\nМодуль 2: Финиш\nТекст");
        assert!(result.success);
        assert_eq!(result.trails[0].modules.len(), 2);
    }
}
