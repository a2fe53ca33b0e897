//! Input format detection from the file extension and content sniffing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Txt,
    Md,
    Json,
    Xml,
    Docx,
    Doc,
    Html,
    Yml,
    Csv,
    Rtf,
    Odt,
    Pdf,
    Rst,
    Tex,
    Org,
    Adoc,
    Unknown,
}

impl Format {
    pub const ALL: [Format; 17] = [
        Format::Txt,
        Format::Md,
        Format::Json,
        Format::Xml,
        Format::Docx,
        Format::Doc,
        Format::Html,
        Format::Yml,
        Format::Csv,
        Format::Rtf,
        Format::Odt,
        Format::Pdf,
        Format::Rst,
        Format::Tex,
        Format::Org,
        Format::Adoc,
        Format::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Txt => "txt",
            Format::Md => "md",
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Docx => "docx",
            Format::Doc => "doc",
            Format::Html => "html",
            Format::Yml => "yml",
            Format::Csv => "csv",
            Format::Rtf => "rtf",
            Format::Odt => "odt",
            Format::Pdf => "pdf",
            Format::Rst => "rst",
            Format::Tex => "tex",
            Format::Org => "org",
            Format::Adoc => "adoc",
            Format::Unknown => "unknown",
        }
    }

    /// Map a file extension (without the dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Format> {
        let format = match ext.to_lowercase().as_str() {
            "txt" | "text" => Format::Txt,
            "md" | "markdown" | "mdown" => Format::Md,
            "json" => Format::Json,
            "xml" => Format::Xml,
            "docx" => Format::Docx,
            "doc" => Format::Doc,
            "html" | "htm" | "xhtml" => Format::Html,
            "yml" | "yaml" => Format::Yml,
            "csv" => Format::Csv,
            "rtf" => Format::Rtf,
            "odt" => Format::Odt,
            "pdf" => Format::Pdf,
            "rst" => Format::Rst,
            "tex" | "latex" => Format::Tex,
            "org" => Format::Org,
            "adoc" | "asciidoc" => Format::Adoc,
            _ => return None,
        };
        Some(format)
    }

    /// Binary containers are never decoded as UTF-8 text up front.
    pub fn is_binary(self) -> bool {
        matches!(self, Format::Docx | Format::Doc | Format::Odt | Format::Pdf)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
pub const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const PDF_MAGIC: &[u8] = b"%PDF";
const RTF_MAGIC: &[u8] = b"{\\rtf";

static MD_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+\S").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(p|div|h[1-6]|ul|ol|li|body|head|span|br|table|section|article)\b").unwrap()
});
static YAML_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(-\s+)?[\w\-]+\s*:(\s|$)|^\s*-\s+\S").unwrap());
static ORG_HEADLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\*+\s+\S").unwrap());
static ORG_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#\+\w+").unwrap());

/// Classify an input. Total: every input maps to exactly one format.
pub fn detect_format(filename: &str, content: &[u8]) -> Format {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    if let Some(format) = Format::from_extension(ext) {
        if format == Format::Json {
            let text = String::from_utf8_lossy(content);
            return if parses_as_json_container(&text) {
                Format::Json
            } else {
                Format::Txt
            };
        }
        return format;
    }

    sniff(content)
}

fn sniff(content: &[u8]) -> Format {
    if content.starts_with(ZIP_MAGIC) {
        return if contains_bytes(content, b"word/") {
            Format::Docx
        } else if contains_bytes(content, b"opendocument.text") {
            Format::Odt
        } else {
            Format::Unknown
        };
    }
    if content.starts_with(OLE_MAGIC) {
        return Format::Doc;
    }
    if content.starts_with(PDF_MAGIC) {
        return Format::Pdf;
    }
    if content.starts_with(RTF_MAGIC) {
        return Format::Rtf;
    }
    if looks_binary(content) {
        return Format::Unknown;
    }

    let text = String::from_utf8_lossy(content);
    let text = text.trim_start_matches('\u{feff}');
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Format::Txt;
    }

    let sniffers: [(Format, fn(&str) -> bool); 8] = [
        (Format::Json, parses_as_json_container),
        (Format::Xml, looks_like_xml),
        (Format::Yml, looks_like_yaml),
        (Format::Html, looks_like_html),
        (Format::Md, looks_like_markdown),
        (Format::Rst, looks_like_rst),
        (Format::Tex, looks_like_latex),
        (Format::Org, looks_like_org),
    ];

    sniffers
        .iter()
        .find(|(_, sniffer)| sniffer(trimmed))
        .map(|(format, _)| *format)
        .unwrap_or(Format::Txt)
}

fn parses_as_json_container(text: &str) -> bool {
    let trimmed = text.trim().trim_start_matches('\u{feff}');
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return false;
    }
    matches!(
        serde_json::from_str::<serde_json::Value>(trimmed),
        Ok(serde_json::Value::Object(_)) | Ok(serde_json::Value::Array(_))
    )
}

fn looks_like_xml(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.starts_with("<?xml") || lower.contains("<trail") || lower.contains("<module")
}

fn looks_like_yaml(text: &str) -> bool {
    if !text.starts_with("---") {
        return false;
    }
    let lines: Vec<&str> = text
        .lines()
        .skip(1)
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty() && l.trim() != "---" && !l.trim_start().starts_with('#'))
        .collect();
    if lines.len() < 2 {
        return false;
    }
    let yaml_lines = lines
        .iter()
        .filter(|l| YAML_LINE.is_match(l) || l.starts_with("  "))
        .count();
    yaml_lines * 10 >= lines.len() * 9
}

fn looks_like_html(text: &str) -> bool {
    let lower = text.to_lowercase();
    if lower.starts_with("<!doctype html") || lower.contains("<html") {
        return true;
    }
    HTML_TAG.find_iter(text).count() >= 3
}

fn looks_like_markdown(text: &str) -> bool {
    text.contains("```") || MD_HEADER.is_match(text)
}

fn looks_like_rst(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    lines.windows(2).any(|pair| {
        let (title, rule) = (pair[0].trim(), pair[1]);
        is_rule_line(rule) && !title.is_empty() && !is_rule_line(title) && rule.chars().count() >= title.chars().count()
    })
}

pub(crate) fn is_rule_line(line: &str) -> bool {
    let line = line.trim();
    line.chars().count() >= 3
        && (line.chars().all(|c| c == '=') || line.chars().all(|c| c == '-'))
}

fn looks_like_latex(text: &str) -> bool {
    text.contains("\\documentclass") || text.contains("\\begin{")
}

fn looks_like_org(text: &str) -> bool {
    ORG_HEADLINE.is_match(text) && ORG_DIRECTIVE.is_match(text)
}

fn looks_binary(content: &[u8]) -> bool {
    let sample = &content[..content.len().min(4096)];
    sample.iter().filter(|&&b| b == 0).count() > sample.len() / 100 + 1
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(detect_format("course.md", b"plain"), Format::Md);
        assert_eq!(detect_format("COURSE.DOCX", b""), Format::Docx);
        assert_eq!(detect_format("a.htm", b""), Format::Html);
        assert_eq!(detect_format("a.yaml", b""), Format::Yml);
        assert_eq!(detect_format("a.adoc", b""), Format::Adoc);
    }

    #[test]
    fn test_json_extension_degrades_to_txt() {
        assert_eq!(detect_format("a.json", br#"{"trails": []}"#), Format::Json);
        assert_eq!(detect_format("a.json", b"not json at all"), Format::Txt);
        assert_eq!(detect_format("a.json", b"42"), Format::Txt);
    }

    #[test]
    fn test_sniff_priority() {
        assert_eq!(detect_format("upload", br#"[{"title": "x"}]"#), Format::Json);
        assert_eq!(
            detect_format("upload", b"<?xml version=\"1.0\"?><trail/>"),
            Format::Xml
        );
        assert_eq!(
            detect_format("upload", b"---\ntitle: A\nmodules:\n  - name: B\n"),
            Format::Yml
        );
        assert_eq!(
            detect_format("upload", b"<!DOCTYPE html><html><body></body></html>"),
            Format::Html
        );
        assert_eq!(detect_format("upload", b"# Title\n\nText"), Format::Md);
        assert_eq!(detect_format("upload", b"Title\n=====\n\nBody"), Format::Rst);
        assert_eq!(
            detect_format("upload", b"\\documentclass{article}\n\\begin{document}"),
            Format::Tex
        );
        assert_eq!(
            detect_format("upload", b"#+TITLE: Course\n* Lesson one\nBody"),
            Format::Org
        );
        assert_eq!(detect_format("upload", b"just some words"), Format::Txt);
    }

    #[test]
    fn test_markdown_with_frontmatter_is_not_yaml() {
        let md = b"---\ntitle: A\n---\n# Heading\n\nSome paragraph text here.";
        assert_eq!(detect_format("upload", md), Format::Md);
    }

    #[test]
    fn test_structured_txt_is_not_rst() {
        let txt = b"=== TRAIL ===\ntitle: Vibe Coding\n=== MODULE ===\ntype: theory\n---\nHello";
        assert_eq!(detect_format("upload", txt), Format::Txt);
    }

    #[test]
    fn test_binary_magic() {
        let mut ole = OLE_MAGIC.to_vec();
        ole.extend_from_slice(&[0u8; 64]);
        assert_eq!(detect_format("upload", &ole), Format::Doc);
        assert_eq!(detect_format("upload", b"%PDF-1.7"), Format::Pdf);
        assert_eq!(detect_format("upload", b"{\\rtf1\\ansi hi}"), Format::Rtf);
        assert_eq!(detect_format("upload", &[0u8, 1, 2, 0, 0, 0, 9]), Format::Unknown);
    }

    #[test]
    fn test_detection_is_idempotent() {
        let inputs: [(&str, &[u8]); 3] = [
            ("x.json", b"{broken"),
            ("noext", b"# hi"),
            ("", b""),
        ];
        for (name, content) in inputs {
            assert_eq!(detect_format(name, content), detect_format(name, content));
        }
    }
}
