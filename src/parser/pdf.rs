use super::text;
use crate::error::ImportError;
use crate::model::ParseResult;

/// Extract text from a PDF held in memory
pub fn extract_text(bytes: &[u8]) -> Result<String, ImportError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ImportError::Decode(format!("cannot extract PDF text: {}", e)))?;

    let cleaned = clean_pdf_text(&text);
    if cleaned.is_empty() {
        return Err(ImportError::Decode("PDF has no extractable text".into()));
    }
    Ok(cleaned)
}

pub fn parse(bytes: &[u8], structured_threshold: u32) -> Result<ParseResult, ImportError> {
    let text = extract_text(bytes)?;
    Ok(text::parse_with_threshold(&text, structured_threshold))
}

/// Clean up extracted PDF text
fn clean_pdf_text(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank = false;
    for line in text.lines().map(str::trim) {
        // Keep one blank line: paragraph breaks drive the heading rules.
        if line.is_empty() {
            blank = !out.is_empty();
            continue;
        }
        if blank {
            out.push("");
            blank = false;
        }
        out.push(line);
    }
    out.join("\n")
        .replace("  ", " ")
        // Remove common PDF artifacts
        .replace('\u{0}', "")
        .replace('\u{FEFF}', "")
        .replace('\u{0C}', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_pdf_text() {
        let dirty = "  Hello  \n\n\n  World  \n  ";
        let clean = clean_pdf_text(dirty);
        assert_eq!(clean, "Hello\n\nWorld");
    }
}
