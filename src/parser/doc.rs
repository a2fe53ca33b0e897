//! Legacy Word binaries and RTF.
//!
//! There is no OLE directory parser here: probable text is sniffed straight
//! from the raw bytes, once as UTF-16LE runs and once as CP1251 runs, and the
//! better pass wins. OLE text carries no markup, so structure comes from the
//! plain-text heading heuristics.

use encoding_rs::WINDOWS_1251;

use super::text;
use crate::detect::OLE_MAGIC;
use crate::error::ImportError;
use crate::model::ParseResult;

const RTF_MAGIC: &[u8] = b"{\\rtf";
/// Runs shorter than this are treated as binary noise.
const MIN_RUN_CHARS: usize = 12;

/// Words that only ever appear in the non-text streams of a `.doc` file.
const NOISE_MARKERS: &[&str] = &[
    "Times New Roman",
    "Microsoft",
    "Normal.dot",
    "Root Entry",
    "WordDocument",
    "SummaryInformation",
    "DocumentSummary",
    "CompObj",
    "Calibri",
    "Arial",
    "Symbol",
    "Courier New",
    "Cambria",
    "HYPERLINK",
    "MERGEFORMAT",
    "_Toc",
    "Heading",
    "Default Paragraph Font",
    "Table Normal",
    "No List",
];

pub fn parse(buffer: &[u8]) -> Result<ParseResult, ImportError> {
    if buffer.starts_with(RTF_MAGIC) {
        return Ok(text::parse(&rtf_to_text(buffer)));
    }
    if buffer.starts_with(OLE_MAGIC) {
        let extracted = extract_text(buffer)?;
        return Ok(text::parse_heuristic(&extracted));
    }
    // Some "doc" uploads are plain text with the wrong extension.
    if let Ok(plain) = std::str::from_utf8(buffer)
        && !plain.trim().is_empty()
        && !plain.contains('\0')
    {
        let mut result = text::parse(plain);
        result
            .warnings
            .insert(0, "File has a .doc name but contains plain text".into());
        return Ok(result);
    }
    Err(ImportError::InvalidSignature { container: "OLE" })
}

/// Probable document text of an OLE compound file.
pub fn extract_text(buffer: &[u8]) -> Result<String, ImportError> {
    if !buffer.starts_with(OLE_MAGIC) {
        return Err(ImportError::InvalidSignature { container: "OLE" });
    }
    let utf16 = clean_runs(utf16_runs(buffer));
    let cp1251 = clean_runs(cp1251_runs(buffer));
    let best = if letter_count(&utf16) >= letter_count(&cp1251) {
        utf16
    } else {
        cp1251
    };
    if best.trim().is_empty() {
        return Err(ImportError::Decode("no readable text found in the Word document".into()));
    }
    Ok(best)
}

fn letter_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphabetic()).count()
}

fn is_text_char(c: char) -> bool {
    matches!(c, '\n' | '\t')
        || (' '..='~').contains(&c)
        || ('\u{00A0}'..='\u{00FF}').contains(&c)
        || ('\u{0400}'..='\u{04FF}').contains(&c)
        || ('\u{2010}'..='\u{2044}').contains(&c)
        || c == '№'
}

/// Word control characters mapped to text: paragraph and cell marks become
/// line breaks, field delimiters vanish.
fn map_control(c: char) -> Option<char> {
    match c {
        '\r' | '\u{0B}' | '\u{0C}' | '\u{07}' => Some('\n'),
        '\u{13}' | '\u{14}' | '\u{15}' | '\u{01}' | '\u{08}' => None,
        '\u{1E}' => Some('-'),
        '\u{1F}' => None,
        other => Some(other),
    }
}

fn utf16_runs(buffer: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    for offset in [0usize, 1] {
        let mut run = String::new();
        for pair in buffer[offset.min(buffer.len())..].chunks_exact(2) {
            let unit = u16::from_le_bytes([pair[0], pair[1]]);
            let Some(c) = char::from_u32(unit as u32) else {
                flush_run(&mut run, &mut runs);
                continue;
            };
            let c = if c.is_control() && !matches!(c, '\n' | '\t') {
                match map_control(c) {
                    Some(mapped) if mapped != c => mapped,
                    Some(_) => {
                        flush_run(&mut run, &mut runs);
                        continue;
                    }
                    None => continue,
                }
            } else {
                c
            };
            if is_text_char(c) {
                run.push(c);
            } else {
                flush_run(&mut run, &mut runs);
            }
        }
        flush_run(&mut run, &mut runs);
    }
    runs
}

fn cp1251_runs(buffer: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &b) in buffer.iter().enumerate() {
        let texty = matches!(b, b'\r' | b'\n' | b'\t' | 0x20..=0x7E | 0xA8 | 0xB8 | 0xB9 | 0xC0..=0xFF);
        match (texty, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                let (decoded, _, _) = WINDOWS_1251.decode(&buffer[s..i]);
                let mut run = decoded.replace('\r', "\n");
                flush_run(&mut run, &mut runs);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        let (decoded, _, _) = WINDOWS_1251.decode(&buffer[s..]);
        let mut run = decoded.replace('\r', "\n");
        flush_run(&mut run, &mut runs);
    }
    runs
}

fn flush_run(run: &mut String, runs: &mut Vec<String>) {
    let taken = std::mem::take(run);
    if taken.trim().chars().count() >= MIN_RUN_CHARS {
        runs.push(taken);
    }
}

fn is_noise(run: &str) -> bool {
    let trimmed = run.trim();
    let chars = trimmed.chars().count();
    if chars == 0 {
        return true;
    }
    let letters = letter_count(trimmed);
    let spaces = trimmed.chars().filter(|c| c.is_whitespace()).count();
    // Text has words; binary garbage and identifiers do not.
    letters * 2 < chars
        || (spaces == 0 && chars > 40)
        || NOISE_MARKERS.iter().any(|m| trimmed.contains(m))
        || trimmed.contains('\\')
}

fn clean_runs(runs: Vec<String>) -> String {
    let mut out: Vec<String> = Vec::new();
    for run in runs {
        if is_noise(&run) {
            continue;
        }
        let text = run
            .lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n");
        if !out.iter().any(|existing| existing == &text) {
            out.push(text);
        }
    }
    out.join("\n")
}

/// Strip RTF control words and groups, keeping the text. `\'xx` escapes are
/// CP1251, `\uN` escapes are Unicode code points.
pub fn rtf_to_text(buffer: &[u8]) -> String {
    const SKIP_DESTINATIONS: &[&str] = &[
        "fonttbl", "colortbl", "stylesheet", "info", "pict", "object", "header", "footer", "listtable",
        "listoverridetable", "rsidtbl", "themedata", "datastore", "latentstyles", "generator",
    ];

    let mut out = String::new();
    let mut pending_bytes: Vec<u8> = Vec::new();
    // Per group: is it skipped?
    let mut stack: Vec<bool> = vec![false];
    let mut skip_next_char = 0usize;
    let mut i = 0;

    let flush = |pending: &mut Vec<u8>, out: &mut String| {
        if !pending.is_empty() {
            let (decoded, _, _) = WINDOWS_1251.decode(pending);
            out.push_str(&decoded);
            pending.clear();
        }
    };

    while i < buffer.len() {
        let skipping = stack.last().copied().unwrap_or(false);
        let b = buffer[i];
        match b {
            b'{' => {
                flush(&mut pending_bytes, &mut out);
                let mut skip = skipping;
                if buffer.get(i + 1..i + 3) == Some(b"\\*") {
                    skip = true;
                }
                stack.push(skip);
                i += 1;
            }
            b'}' => {
                flush(&mut pending_bytes, &mut out);
                if stack.len() > 1 {
                    stack.pop();
                }
                i += 1;
            }
            b'\\' => {
                let next = buffer.get(i + 1).copied().unwrap_or(b' ');
                if next == b'\'' {
                    let hex = buffer.get(i + 2..i + 4).and_then(|h| std::str::from_utf8(h).ok());
                    if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok())
                        && !skipping
                    {
                        if skip_next_char > 0 {
                            skip_next_char -= 1;
                        } else {
                            pending_bytes.push(byte);
                        }
                    }
                    i += 4;
                    continue;
                }
                if matches!(next, b'\\' | b'{' | b'}') {
                    if !skipping {
                        flush(&mut pending_bytes, &mut out);
                        out.push(next as char);
                    }
                    i += 2;
                    continue;
                }
                // Control word: letters, optional signed number, optional space.
                let mut j = i + 1;
                while j < buffer.len() && buffer[j].is_ascii_alphabetic() {
                    j += 1;
                }
                let word = std::str::from_utf8(&buffer[i + 1..j]).unwrap_or("");
                let num_start = j;
                if j < buffer.len() && buffer[j] == b'-' {
                    j += 1;
                }
                while j < buffer.len() && buffer[j].is_ascii_digit() {
                    j += 1;
                }
                let number = std::str::from_utf8(&buffer[num_start..j])
                    .ok()
                    .and_then(|n| n.parse::<i32>().ok());
                if j < buffer.len() && buffer[j] == b' ' {
                    j += 1;
                }
                if word.is_empty() {
                    // Control symbol such as `\~` or `\-`.
                    if next == b'~' && !skipping {
                        out.push(' ');
                    }
                    i += 2;
                    continue;
                }
                if SKIP_DESTINATIONS.contains(&word) {
                    if let Some(top) = stack.last_mut() {
                        *top = true;
                    }
                } else if !skipping {
                    flush(&mut pending_bytes, &mut out);
                    match word {
                        "par" | "line" | "row" | "sect" | "page" => out.push('\n'),
                        "tab" | "cell" => out.push('\t'),
                        "u" => {
                            if let Some(n) = number {
                                let code = (if n < 0 { n + 65536 } else { n }) as u32;
                                if let Some(c) = char::from_u32(code) {
                                    out.push(c);
                                }
                                skip_next_char = 1;
                            }
                        }
                        "emdash" => out.push('—'),
                        "endash" => out.push('–'),
                        "bullet" => out.push('•'),
                        "lquote" | "rquote" => out.push('\''),
                        "ldblquote" | "rdblquote" => out.push('"'),
                        _ => {}
                    }
                }
                i = j;
            }
            b'\r' | b'\n' => i += 1,
            _ => {
                if !skipping {
                    if skip_next_char > 0 {
                        skip_next_char -= 1;
                    } else {
                        pending_bytes.push(b);
                    }
                }
                i += 1;
            }
        }
    }
    flush(&mut pending_bytes, &mut out);
    out.lines().map(str::trim).collect::<Vec<_>>().join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ole_with_utf16(text: &str) -> Vec<u8> {
        let mut bytes = OLE_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 504]);
        bytes.extend_from_slice(b"Root Entry\0\0WordDocument\0\0");
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(&[0u8; 64]);
        bytes
    }

    #[test]
    fn test_utf16_text_extraction() {
        let doc = ole_with_utf16("Модуль 1: Введение\rПервый урок курса по Python.\rМодуль 2: Циклы\rЦиклы повторяют действия.\r");
        let text = extract_text(&doc).unwrap();
        assert!(text.contains("Модуль 1: Введение"));
        assert!(text.contains("Циклы повторяют действия."));
        assert!(!text.contains("WordDocument"));

        let result = parse(&doc).unwrap();
        assert!(result.success);
        assert_eq!(result.trails[0].modules.len(), 2);
    }

    #[test]
    fn test_cp1251_text_extraction() {
        let (encoded, _, _) = WINDOWS_1251.encode("Урок первый: основы программирования на языке Rust");
        let mut doc = OLE_MAGIC.to_vec();
        doc.extend_from_slice(&[0u8; 32]);
        doc.extend_from_slice(&encoded);
        doc.extend_from_slice(&[0u8; 32]);
        let text = extract_text(&doc).unwrap();
        assert!(text.contains("основы программирования"));
    }

    #[test]
    fn test_bad_signature() {
        let err = parse(&[0x00, 0x01, 0x02, 0x03, 0x00]).unwrap_err();
        assert!(matches!(err, ImportError::InvalidSignature { container: "OLE" }));
    }

    #[test]
    fn test_plain_text_fallback() {
        let result = parse("Урок 1\nТекст".as_bytes()).unwrap();
        assert!(result.success);
        assert!(result.warnings[0].contains("plain text"));
    }

    #[test]
    fn test_rtf_to_text() {
        let rtf = br"{\rtf1\ansi\ansicpg1251{\fonttbl{\f0 Times New Roman;}}{\*\generator Riched20;}\f0 Hello \b World\b0\par \'cf\'f0\'e8\'e2\'e5\'f2\par \u1055?\u1088?\u1080?}";
        let text = rtf_to_text(rtf);
        assert_eq!(text, "Hello World\nПривет\nПри");
    }
}
