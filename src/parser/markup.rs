//! reStructuredText, AsciiDoc, Org-mode and LaTeX are rewritten to the
//! Markdown subset the Markdown parser reads, then parsed as Markdown.

use regex::Regex;
use std::sync::LazyLock;

use super::markdown;
use crate::detect::{Format, is_rule_line};
use crate::model::ParseResult;

pub fn parse(format: Format, content: &str) -> ParseResult {
    markdown::parse(&to_markdown(format, content))
}

/// Markdown rendition of a lightweight-markup document. Formats without a
/// rewrite are returned unchanged.
pub fn to_markdown(format: Format, content: &str) -> String {
    match format {
        Format::Rst => rst_to_markdown(content),
        Format::Adoc => adoc_to_markdown(content),
        Format::Org => org_to_markdown(content),
        Format::Tex => tex_to_markdown(content),
        _ => content.to_string(),
    }
}

fn frontmatter(title: Option<String>, body: String) -> String {
    match title {
        Some(title) => format!("---\ntitle: {}\n---\n{}", title, body),
        None => body,
    }
}

/// Underline (and optional overline) adornments; heading levels follow the
/// order in which adornment characters first appear.
fn rst_to_markdown(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut styles: Vec<(char, bool)> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let overline = is_adornment(line)
            && lines.get(i + 2).is_some_and(|l| is_adornment(l))
            && lines.get(i + 1).is_some_and(|l| !l.trim().is_empty());
        if overline {
            let style = (adornment_char(line), true);
            out.push(rst_heading(&mut styles, style, lines[i + 1].trim()));
            i += 3;
            continue;
        }
        let underlined = !line.trim().is_empty()
            && !is_adornment(line)
            && lines
                .get(i + 1)
                .is_some_and(|next| is_adornment(next) && next.trim().chars().count() >= line.trim().chars().count());
        if underlined {
            let style = (adornment_char(lines[i + 1]), false);
            out.push(rst_heading(&mut styles, style, line.trim()));
            i += 2;
            continue;
        }
        let directive = line.trim_start();
        if let Some(rest) = directive
            .strip_prefix(".. code-block::")
            .or_else(|| directive.strip_prefix(".. code::"))
        {
            out.push(format!("```{}", rest.trim()));
            i += 1;
            // Indented block, after an optional blank line.
            while i < lines.len() && (lines[i].trim().is_empty() || lines[i].starts_with([' ', '\t'])) {
                if !lines[i].trim().is_empty() || lines.get(i + 1).is_some_and(|l| l.starts_with([' ', '\t'])) {
                    out.push(lines[i].trim_start().to_string());
                }
                i += 1;
            }
            out.push("```".to_string());
            continue;
        }
        if line.trim_start().starts_with(".. ") {
            // Directives and comments carry no course text.
            i += 1;
            continue;
        }
        out.push(line.replace("``", "`"));
        i += 1;
    }
    out.join("\n")
}

fn is_adornment(line: &str) -> bool {
    let line = line.trim_end();
    let mut chars = line.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    is_rule_line(line) || (line.chars().count() >= 3 && "=-~^*+#\"'`:.".contains(first) && chars.all(|c| c == first))
}

fn adornment_char(line: &str) -> char {
    line.trim().chars().next().unwrap_or('=')
}

fn rst_heading(styles: &mut Vec<(char, bool)>, style: (char, bool), title: &str) -> String {
    let level = match styles.iter().position(|s| *s == style) {
        Some(pos) => pos + 1,
        None => {
            styles.push(style);
            styles.len()
        }
    };
    format!("{} {}", "#".repeat(level.min(6)), title)
}

static ADOC_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(={1,6})\s+(\S.*)$").unwrap());
static ADOC_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^:[\w-]+:").unwrap());

fn adoc_to_markdown(content: &str) -> String {
    let mut out = Vec::new();
    let mut in_block = false;
    for line in content.lines() {
        let trimmed = line.trim_end();
        if trimmed == "----" || trimmed == "...." {
            out.push("```".to_string());
            in_block = !in_block;
            continue;
        }
        if in_block {
            out.push(line.to_string());
            continue;
        }
        if let Some(caps) = ADOC_HEADING.captures(trimmed) {
            out.push(format!("{} {}", "#".repeat(caps[1].len()), &caps[2]));
        } else if ADOC_ATTRIBUTE.is_match(trimmed) || trimmed.starts_with("[source") || trimmed.starts_with("//") {
            continue;
        } else if let Some(item) = trimmed.strip_prefix(". ") {
            out.push(format!("1. {}", item));
        } else if let Some(item) = trimmed.strip_prefix("* ") {
            out.push(format!("- {}", item));
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

static ORG_HEADLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\*+)\s+(?:(?:TODO|DONE)\s+)?(.+?)(?:\s+:[\w:]+:)?\s*$").unwrap());
static ORG_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^#\+(\w+):?\s*(.*)$").unwrap());

fn org_to_markdown(content: &str) -> String {
    let mut title = None;
    let mut out = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(caps) = ORG_DIRECTIVE.captures(trimmed) {
            match caps[1].to_lowercase().as_str() {
                "title" => title = Some(caps[2].trim().to_string()),
                "begin_src" | "begin_example" => out.push(format!("```{}", caps[2].trim())),
                "end_src" | "end_example" => out.push("```".to_string()),
                _ => {}
            }
            continue;
        }
        if let Some(caps) = ORG_HEADLINE.captures(line) {
            // With a #+TITLE the top headlines are modules.
            let depth = caps[1].len() + usize::from(title.is_some());
            out.push(format!("{} {}", "#".repeat(depth.min(6)), &caps[2]));
        } else if let Some(item) = trimmed.strip_prefix("- [X] ") {
            out.push(format!("- [x] {}", item));
        } else {
            out.push(line.to_string());
        }
    }
    frontmatter(title, out.join("\n"))
}

static TEX_TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\title\{([^}]*)\}").unwrap());
static TEX_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\\(chapter|section|subsection|subsubsection)\*?\{(.*)\}\s*$").unwrap());
static TEX_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\textbf\{([^}]*)\}").unwrap());
static TEX_ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\(?:emph|textit)\{([^}]*)\}").unwrap());
static TEX_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\(?:texttt|verb\|)\{?([^}|]*)[}|]").unwrap());
static TEX_COMMAND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+\*?(?:\[[^\]]*\])?(?:\{[^}]*\})?").unwrap());

fn tex_to_markdown(content: &str) -> String {
    let title = TEX_TITLE.captures(content).map(|c| c[1].trim().to_string());
    let has_chapters = content.contains("\\chapter");
    let body = content
        .split_once("\\begin{document}")
        .map_or(content, |(_, body)| body);
    let body = body.split("\\end{document}").next().unwrap_or(body);

    let mut out = Vec::new();
    let mut verbatim = false;
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("\\begin{verbatim}") || trimmed.starts_with("\\begin{lstlisting}") {
            out.push("```".to_string());
            verbatim = true;
            continue;
        }
        if trimmed.starts_with("\\end{verbatim}") || trimmed.starts_with("\\end{lstlisting}") {
            out.push("```".to_string());
            verbatim = false;
            continue;
        }
        if verbatim {
            out.push(line.to_string());
            continue;
        }
        if trimmed.starts_with('%') || trimmed == "\\maketitle" {
            continue;
        }
        if let Some(caps) = TEX_SECTION.captures(trimmed) {
            let level = match (&caps[1], has_chapters) {
                ("chapter", _) => 2,
                ("section", false) => 2,
                ("section", true) | ("subsection", false) => 3,
                _ => 4,
            };
            out.push(format!("{} {}", "#".repeat(level), caps[2].trim()));
            continue;
        }
        let line = match trimmed.strip_prefix("\\item") {
            Some(item) => format!("- {}", item.trim()),
            None => trimmed.to_string(),
        };
        let line = TEX_BOLD.replace_all(&line, "**$1**");
        let line = TEX_ITALIC.replace_all(&line, "_${1}_");
        let line = TEX_CODE.replace_all(&line, "`$1`");
        let line = TEX_COMMAND.replace_all(&line, "");
        out.push(line.replace("\\\\", "").replace(['{', '}'], "").trim_end().to_string());
    }
    let body = out.join("\n");
    // Sections sit under the document title as an H1.
    let body = match &title {
        Some(title) => format!("# {}\n\n{}", title, body.trim()),
        None => body,
    };
    frontmatter(title, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rst_heading_levels() {
        let rst = "Python Course\n=============\n\nIntro text.\n\nVariables\n---------\n\nNames for values.\n\nLoops\n-----\n\nRepeat things.\n";
        let md = rst_to_markdown(rst);
        assert!(md.contains("# Python Course"));
        assert!(md.contains("## Variables"));
        assert!(md.contains("## Loops"));

        let result = parse(Format::Rst, rst);
        assert_eq!(result.trails[0].title, "Python Course");
        assert_eq!(result.trails[0].modules.len(), 2);
    }

    #[test]
    fn test_adoc_headings_and_blocks() {
        let adoc = "= Rust Basics\n:author: Team\n\n== Ownership\n\nEach value has an owner.\n\n----\n== not a heading\n----\n";
        let md = adoc_to_markdown(adoc);
        assert!(md.starts_with("# Rust Basics"));
        assert!(md.contains("## Ownership"));
        assert!(md.contains("```\n== not a heading\n```"));
        assert!(!md.contains(":author:"));
    }

    #[test]
    fn test_org_title_and_headlines() {
        let org = "#+TITLE: Git Course\n* Commits\nSnapshots.\n* TODO Branches :draft:\nLines of work.\n";
        let result = parse(Format::Org, org);
        assert!(result.success);
        let trail = &result.trails[0];
        assert_eq!(trail.title, "Git Course");
        assert_eq!(trail.modules.len(), 2);
        assert_eq!(trail.modules[1].title, "Branches");
    }

    #[test]
    fn test_latex_sections() {
        let tex = "\\documentclass{article}\n\\title{Algorithms}\n\\begin{document}\n\\maketitle\n\\section{Sorting}\nWe sort \\textbf{arrays}.\n\\begin{itemize}\n\\item Quick sort\n\\end{itemize}\n\\section{Searching}\nBinary search.\n\\end{document}\n";
        let md = tex_to_markdown(tex);
        assert!(md.contains("## Sorting"));
        assert!(md.contains("**arrays**"));
        assert!(md.contains("- Quick sort"));

        let result = parse(Format::Tex, tex);
        let trail = &result.trails[0];
        assert_eq!(trail.title, "Algorithms");
        assert_eq!(trail.modules.len(), 2);
    }
}
