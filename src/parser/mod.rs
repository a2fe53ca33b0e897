//! Deterministic, network-free parsers: one per format, all producing a
//! [`ParseResult`] with `parseMethod = "code"`.

pub mod aliases;
pub mod chunker;
pub mod common;
pub mod container;
pub mod doc;
pub mod docx;
pub mod html;
pub mod json;
pub mod markdown;
pub mod markup;
pub mod normalize;
pub mod pdf;
pub mod text;
pub mod validate;
pub mod xml;

use encoding_rs::WINDOWS_1251;
use tracing::debug;

use crate::detect::Format;
use crate::error::ImportError;
use crate::model::{ParseMethod, ParseResult};

/// Decode text input: UTF-8 (BOM stripped), falling back to CP1251 for
/// legacy Cyrillic files.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (decoded, _, _) = WINDOWS_1251.decode(bytes);
            decoded.into_owned()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Analyzer confidence above which the strict marker parser runs.
    pub structured_threshold: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            structured_threshold: text::DEFAULT_STRUCTURED_THRESHOLD,
        }
    }
}

/// Run the deterministic parser for `format`. Container problems become a
/// failed result rather than an error.
pub fn parse_document(format: Format, bytes: &[u8], options: &ParseOptions) -> ParseResult {
    debug!(%format, bytes = bytes.len(), "Parsing document");
    let parsed = match format {
        Format::Docx => docx::parse(bytes),
        Format::Odt => docx::parse_odt(bytes),
        Format::Doc | Format::Rtf => doc::parse(bytes),
        Format::Pdf => pdf::parse(bytes, options.structured_threshold),
        Format::Unknown => Err(ImportError::UnsupportedFormat("unknown".into())),
        _ => Ok(parse_text(format, &decode_text(bytes), options)),
    };
    parsed.unwrap_or_else(|err| ParseResult::failure(ParseMethod::Code, err.to_string()))
}

/// Parse an already-decoded text format.
pub fn parse_text(format: Format, content: &str, options: &ParseOptions) -> ParseResult {
    if content.trim().is_empty() {
        return ParseResult::failure(ParseMethod::Code, "Document is empty");
    }
    match format {
        Format::Md => markdown::parse(content),
        Format::Json => json::parse(content),
        Format::Xml => xml::parse(content),
        Format::Html => html::parse(content),
        Format::Rst | Format::Adoc | Format::Org | Format::Tex => markup::parse(format, content),
        Format::Rtf => text::parse_with_threshold(&doc::rtf_to_text(content.as_bytes()), options.structured_threshold),
        _ => text::parse_with_threshold(content, options.structured_threshold),
    }
}

/// Plain text of a document, as sent to the AI parser.
pub fn extract_text(format: Format, bytes: &[u8]) -> Result<String, ImportError> {
    let text = match format {
        Format::Docx => docx::extract_markdown(&container::MinimalZipReader, bytes)?,
        Format::Odt => docx::extract_odt_markdown(&container::MinimalZipReader, bytes)?,
        Format::Doc if bytes.starts_with(crate::detect::OLE_MAGIC) => doc::extract_text(bytes)?,
        Format::Doc | Format::Rtf if bytes.starts_with(b"{\\rtf") => doc::rtf_to_text(bytes),
        Format::Pdf => pdf::extract_text(bytes)?,
        Format::Html => html::html_to_markdown(&decode_text(bytes)),
        _ => decode_text(bytes),
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_handles_bom_and_cp1251() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFhello"), "hello");
        let (cp1251, _, _) = WINDOWS_1251.encode("Привет");
        assert_eq!(decode_text(&cp1251), "Привет");
    }

    #[test]
    fn test_dispatch_by_format() {
        let options = ParseOptions::default();
        let md = parse_document(Format::Md, b"# Course\n\n## Lesson\n\nText", &options);
        assert!(md.success);
        assert_eq!(md.parse_method, ParseMethod::Code);
        assert_eq!(md.trails[0].modules[0].title, "Lesson");

        let yml = parse_document(Format::Yml, b"title: Notes\nModule 1: First\nBody", &options);
        assert!(yml.success);
    }

    #[test]
    fn test_bad_container_is_a_failed_result() {
        let result = parse_document(Format::Docx, b"not a zip at all", &ParseOptions::default());
        assert!(!result.success);
        assert!(result.trails.is_empty());
        assert!(result.errors[0].contains("ZIP"));
    }

    #[test]
    fn test_unknown_format_fails() {
        let result = parse_document(Format::Unknown, b"???", &ParseOptions::default());
        assert!(!result.success);
    }

    #[test]
    fn test_empty_document_fails() {
        let result = parse_text(Format::Txt, "  \n ", &ParseOptions::default());
        assert!(!result.success);
    }
}
