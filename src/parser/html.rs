use scraper::{ElementRef, Html, Node, Selector};

use super::markdown;
use crate::model::ParseResult;

/// Parse an HTML document by rewriting it to Markdown first.
pub fn parse(content: &str) -> ParseResult {
    markdown::parse(&html_to_markdown(content))
}

/// Rewrite HTML to the Markdown subset the Markdown parser understands.
/// Entities are decoded by the HTML parser itself.
pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();

    // Prefer the main content region when the page has one
    let root = ["main", "article", "body"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    render_children(&root, &mut out);
    clean_markdown(&out)
}

fn render_children(element: &ElementRef, out: &mut String) {
    for node in element.children() {
        match node.value() {
            Node::Text(text) => {
                let collapsed = collapse_whitespace(text);
                if !collapsed.trim().is_empty() {
                    if out.ends_with('\n') {
                        out.push_str(collapsed.trim_start());
                    } else {
                        out.push_str(&collapsed);
                    }
                }
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(node) {
                    render_element(&child, out);
                }
            }
            _ => {}
        }
    }
}

fn inline_text(element: &ElementRef) -> String {
    let mut buf = String::new();
    render_children(element, &mut buf);
    buf.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn render_element(element: &ElementRef, out: &mut String) {
    let tag = element.value().name();
    match tag {
        "script" | "style" | "noscript" | "head" | "template" => {}
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = tag[1..].parse::<usize>().unwrap_or(1);
            let text = inline_text(element);
            if !text.is_empty() {
                block_break(out);
                out.push_str(&format!("{} {}\n\n", "#".repeat(level), text));
            }
        }
        "p" | "div" | "section" | "article" | "header" | "footer" | "blockquote" | "figure" => {
            block_break(out);
            render_children(element, out);
            line_break(out);
        }
        "br" => out.push('\n'),
        "hr" => {
            block_break(out);
            out.push_str("---\n\n");
        }
        "ul" | "ol" => {
            line_break(out);
            let ordered = tag == "ol";
            let mut n = 0;
            for child in element.children().filter_map(ElementRef::wrap) {
                if child.value().name() != "li" {
                    continue;
                }
                n += 1;
                let marker = if ordered { format!("{}.", n) } else { "-".to_string() };
                out.push_str(&format!("{} {}{}\n", marker, checkbox_prefix(&child), inline_text(&child)));
            }
            out.push('\n');
        }
        "li" => {
            line_break(out);
            out.push_str(&format!("- {}{}\n", checkbox_prefix(element), inline_text(element)));
        }
        "strong" | "b" => wrap_inline(element, "**", out),
        // Underscores: a trailing `*` would read as a correct-answer marker.
        "em" | "i" => wrap_inline(element, "_", out),
        "code" => wrap_inline(element, "`", out),
        "pre" => {
            block_break(out);
            let code: String = element.text().collect();
            out.push_str(&format!("```\n{}\n```\n\n", code.trim_end()));
        }
        "table" => {
            block_break(out);
            let rows = Selector::parse("tr").ok();
            let cells = Selector::parse("td, th").ok();
            if let (Some(rows), Some(cells)) = (rows, cells) {
                for row in element.select(&rows) {
                    let line: Vec<String> = row.select(&cells).map(|c| inline_text(&c)).collect();
                    out.push_str(&line.join(" | "));
                    out.push('\n');
                }
            }
            out.push('\n');
        }
        "input" => {}
        _ => render_children(element, out),
    }
}

/// `[x] ` / `[ ] ` for list items holding a checkbox.
fn checkbox_prefix(item: &ElementRef) -> &'static str {
    let Ok(selector) = Selector::parse("input[type=checkbox]") else {
        return "";
    };
    match item.select(&selector).next() {
        Some(input) if input.value().attr("checked").is_some() => "[x] ",
        Some(_) => "[ ] ",
        None => "",
    }
}

fn wrap_inline(element: &ElementRef, marker: &str, out: &mut String) {
    let text = inline_text(element);
    if text.is_empty() {
        return;
    }
    if !out.is_empty() && !out.ends_with([' ', '\n']) {
        out.push(' ');
    }
    out.push_str(&format!("{}{}{} ", marker, text, marker));
}

fn block_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with("\n\n") {
        out.push_str(if out.ends_with('\n') { "\n" } else { "\n\n" });
    }
}

fn line_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}

fn clean_markdown(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .collect::<Vec<_>>()
        .join("\n")
        .split("\n\n\n")
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string()
}
