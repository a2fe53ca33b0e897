//! Word (OOXML) and OpenDocument text containers.
//!
//! Paragraphs are rewritten to Markdown (headings from style or outline
//! level, emphasis from run properties, list items from numbering) and the
//! result goes through the Markdown parser.

use regex::Regex;
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::sync::LazyLock;

use super::container::{ContainerExtractor, MinimalZipReader};
use super::markdown;
use crate::error::ImportError;
use crate::model::ParseResult;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const TEXT_NS: &str = "urn:oasis:names:tc:opendocument:xmlns:text:1.0";
const TABLE_NS: &str = "urn:oasis:names:tc:opendocument:xmlns:table:1.0";

static HEADING_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:heading|заголовок|überschrift|titre|título)\s*(\d)$").unwrap()
});

pub fn parse(buffer: &[u8]) -> Result<ParseResult, ImportError> {
    parse_with(&MinimalZipReader, buffer)
}

pub fn parse_with(extractor: &dyn ContainerExtractor, buffer: &[u8]) -> Result<ParseResult, ImportError> {
    Ok(markdown::parse(&extract_markdown(extractor, buffer)?))
}

pub fn parse_odt(buffer: &[u8]) -> Result<ParseResult, ImportError> {
    Ok(markdown::parse(&extract_odt_markdown(&MinimalZipReader, buffer)?))
}

fn xml_entry(extractor: &dyn ContainerExtractor, buffer: &[u8], name: &str) -> Result<Option<String>, ImportError> {
    let Some(bytes) = extractor.extract_named_entry(buffer, name)? else {
        return Ok(None);
    };
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|e| ImportError::Decode(format!("{} is not UTF-8: {}", name, e)))
}

fn parse_xml<'a>(name: &str, xml: &'a str) -> Result<Document<'a>, ImportError> {
    Document::parse(xml).map_err(|e| ImportError::Decode(format!("{}: {}", name, e)))
}

/// Style id -> heading level, from `word/styles.xml`. Localized documents
/// use ids such as `1` or `Заголовок1`, so the style name and its outline
/// level are consulted as well.
fn heading_styles(xml: &str) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    let Ok(doc) = Document::parse(xml) else {
        return map;
    };
    for style in doc.descendants().filter(|n| n.has_tag_name((W_NS, "style"))) {
        let Some(id) = style.attribute((W_NS, "styleId")) else {
            continue;
        };
        let name = child(style, "name").and_then(|n| n.attribute((W_NS, "val")));
        let outline = style
            .descendants()
            .find(|n| n.has_tag_name((W_NS, "outlineLvl")))
            .and_then(|n| n.attribute((W_NS, "val")))
            .and_then(|v| v.parse::<usize>().ok());
        let level = name
            .and_then(level_from_style_name)
            .or_else(|| level_from_style_name(id))
            .or(outline.map(|l| l + 1));
        if let Some(level) = level {
            map.insert(id.to_string(), level);
        }
    }
    map
}

fn level_from_style_name(name: &str) -> Option<usize> {
    let trimmed = name.trim();
    if trimmed.eq_ignore_ascii_case("title") || trimmed.eq_ignore_ascii_case("название") {
        return Some(1);
    }
    let caps = HEADING_STYLE.captures(trimmed)?;
    caps[1].parse::<usize>().ok().filter(|l| (1..=6).contains(l))
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name((W_NS, name)))
}

/// A `w:rPr` toggle such as `<w:b/>`; `w:val="0"` / `"false"` turns it off.
fn toggle(props: Option<Node>, name: &str) -> bool {
    props
        .and_then(|p| child(p, name))
        .is_some_and(|n| !matches!(n.attribute((W_NS, "val")), Some("0") | Some("false") | Some("none")))
}

fn run_text(run: Node) -> String {
    let mut text = String::new();
    for node in run.children() {
        match node.tag_name().name() {
            "t" => text.push_str(node.text().unwrap_or("")),
            "tab" => text.push('\t'),
            "br" | "cr" => text.push('\n'),
            _ => {}
        }
    }
    text
}

fn paragraph_text(paragraph: Node) -> String {
    let mut out = String::new();
    for run in paragraph.descendants().filter(|n| n.has_tag_name((W_NS, "r"))) {
        let text = run_text(run);
        if text.trim().is_empty() {
            out.push_str(&text);
            continue;
        }
        let props = child(run, "rPr");
        let marker = match (toggle(props, "b"), toggle(props, "i")) {
            (true, _) => "**",
            (false, true) => "_",
            _ => "",
        };
        // Keep surrounding spaces outside the markers.
        let lead = &text[..text.len() - text.trim_start().len()];
        let trail = &text[text.trim_end().len()..];
        out.push_str(lead);
        out.push_str(marker);
        out.push_str(text.trim());
        out.push_str(marker);
        out.push_str(trail);
    }
    // Adjacent bold runs: `**a****b**` -> `**ab**`.
    out.replace("****", "")
}

fn paragraph_markdown(paragraph: Node, styles: &HashMap<String, usize>) -> Option<String> {
    let props = child(paragraph, "pPr");
    let style = props
        .and_then(|p| child(p, "pStyle"))
        .and_then(|s| s.attribute((W_NS, "val")));
    let outline = props
        .and_then(|p| child(p, "outlineLvl"))
        .and_then(|o| o.attribute((W_NS, "val")))
        .and_then(|v| v.parse::<usize>().ok());
    let level = style
        .and_then(|s| styles.get(s).copied().or_else(|| level_from_style_name(s)))
        .or(outline.map(|l| l + 1))
        .filter(|l| *l <= 6);
    let is_list = props.and_then(|p| child(p, "numPr")).is_some()
        || style.is_some_and(|s| s.to_lowercase().contains("list"));

    let text = paragraph_text(paragraph);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(match level {
        // Heading text is plain; emphasis markers would end up in titles.
        Some(level) => format!("\n{} {}\n", "#".repeat(level), text.replace("**", "").trim()),
        None if is_list => format!("- {}", text),
        None => text.to_string(),
    })
}

fn table_markdown(table: Node) -> String {
    table
        .children()
        .filter(|n| n.has_tag_name((W_NS, "tr")))
        .map(|row| {
            row.children()
                .filter(|n| n.has_tag_name((W_NS, "tc")))
                .map(|cell| {
                    cell.descendants()
                        .filter(|n| n.has_tag_name((W_NS, "p")))
                        .map(|p| paragraph_text(p).trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `word/document.xml` as Markdown.
pub fn extract_markdown(extractor: &dyn ContainerExtractor, buffer: &[u8]) -> Result<String, ImportError> {
    let document = xml_entry(extractor, buffer, "word/document.xml")?
        .ok_or_else(|| ImportError::MissingEntry("word/document.xml".into()))?;
    let styles = xml_entry(extractor, buffer, "word/styles.xml")?
        .map(|xml| heading_styles(&xml))
        .unwrap_or_default();
    let doc = parse_xml("word/document.xml", &document)?;

    let Some(body) = doc.descendants().find(|n| n.has_tag_name((W_NS, "body"))) else {
        return Ok(String::new());
    };
    let mut lines = Vec::new();
    for node in body.children().filter(Node::is_element) {
        match node.tag_name().name() {
            "p" => lines.extend(paragraph_markdown(node, &styles)),
            "tbl" => lines.push(format!("\n{}\n", table_markdown(node))),
            "sdt" => lines.extend(
                node.descendants()
                    .filter(|n| n.has_tag_name((W_NS, "p")))
                    .filter_map(|p| paragraph_markdown(p, &styles)),
            ),
            _ => {}
        }
    }
    Ok(lines.join("\n"))
}

fn odt_text(node: Node) -> String {
    let mut out = String::new();
    for n in node.descendants() {
        if n.is_text() {
            out.push_str(n.text().unwrap_or(""));
        } else if n.has_tag_name((TEXT_NS, "tab")) {
            out.push('\t');
        } else if n.has_tag_name((TEXT_NS, "line-break")) {
            out.push('\n');
        } else if n.has_tag_name((TEXT_NS, "s")) {
            out.push(' ');
        }
    }
    out.trim().to_string()
}

/// `content.xml` of an ODF text document as Markdown.
pub fn extract_odt_markdown(extractor: &dyn ContainerExtractor, buffer: &[u8]) -> Result<String, ImportError> {
    let content = xml_entry(extractor, buffer, "content.xml")?
        .ok_or_else(|| ImportError::MissingEntry("content.xml".into()))?;
    let doc = parse_xml("content.xml", &content)?;

    let mut lines = Vec::new();
    for node in doc.descendants().filter(Node::is_element) {
        if node.has_tag_name((TEXT_NS, "h")) {
            let level = node
                .attribute((TEXT_NS, "outline-level"))
                .and_then(|l| l.parse::<usize>().ok())
                .unwrap_or(1)
                .clamp(1, 6);
            let text = odt_text(node);
            if !text.is_empty() {
                lines.push(format!("\n{} {}\n", "#".repeat(level), text));
            }
        } else if node.has_tag_name((TEXT_NS, "p")) {
            // Paragraphs inside list items and table cells are handled there.
            let nested = node
                .ancestors()
                .skip(1)
                .any(|a| a.has_tag_name((TEXT_NS, "list-item")) || a.has_tag_name((TABLE_NS, "table-cell")));
            let text = odt_text(node);
            if !nested && !text.is_empty() {
                lines.push(text);
            }
        } else if node.has_tag_name((TEXT_NS, "list-item")) {
            let text = odt_text(node);
            if !text.is_empty() {
                lines.push(format!("- {}", text));
            }
        } else if node.has_tag_name((TABLE_NS, "table-row")) {
            let cells: Vec<String> = node
                .children()
                .filter(|c| c.has_tag_name((TABLE_NS, "table-cell")))
                .map(odt_text)
                .collect();
            lines.push(cells.join(" | "));
        }
    }
    Ok(lines.join("\n"))
}
