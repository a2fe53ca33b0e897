//! Named-entry extraction from archive containers (DOCX, ODT).
//!
//! The OOXML/ODF readers only need one or two entries by name, so they go
//! through [`ContainerExtractor`]; [`MinimalZipReader`] implements it for
//! stored and deflated ZIP members.

use flate2::read::DeflateDecoder;
use std::io::Read;

use crate::detect::ZIP_MAGIC;
use crate::error::ImportError;

pub trait ContainerExtractor {
    /// Bytes of the entry called `name`; `Ok(None)` when it does not exist.
    fn extract_named_entry(&self, buffer: &[u8], name: &str) -> Result<Option<Vec<u8>>, ImportError>;
}

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const CENTRAL_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_SIGNATURE: u32 = 0x0403_4b50;
const EOCD_MIN_LEN: usize = 22;
const LOCAL_HEADER_LEN: usize = 30;
const CENTRAL_HEADER_LEN: usize = 46;
/// Decompressed entries larger than this are rejected.
const MAX_ENTRY_SIZE: u64 = 256 * 1024 * 1024;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

#[derive(Debug, Default, Clone, Copy)]
pub struct MinimalZipReader;

#[derive(Debug)]
struct Entry {
    name: String,
    method: u16,
    compressed_size: u64,
    uncompressed_size: u64,
    local_offset: u64,
}

fn u16_at(buf: &[u8], at: usize) -> Option<u16> {
    buf.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn u32_at(buf: &[u8], at: usize) -> Option<u32> {
    buf.get(at..at + 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn corrupt(what: &str) -> ImportError {
    ImportError::Container(format!("corrupt ZIP archive: {}", what))
}

impl MinimalZipReader {
    fn end_of_central_directory(buffer: &[u8]) -> Result<usize, ImportError> {
        if buffer.len() < EOCD_MIN_LEN {
            return Err(corrupt("too short"));
        }
        // The record sits at the end, followed by a comment of up to 64 KiB.
        let lowest = buffer.len().saturating_sub(EOCD_MIN_LEN + u16::MAX as usize);
        (lowest..=buffer.len() - EOCD_MIN_LEN)
            .rev()
            .find(|&at| u32_at(buffer, at) == Some(EOCD_SIGNATURE))
            .ok_or_else(|| corrupt("end of central directory not found"))
    }

    fn entries(buffer: &[u8]) -> Result<Vec<Entry>, ImportError> {
        let eocd = Self::end_of_central_directory(buffer)?;
        let count = u16_at(buffer, eocd + 10).ok_or_else(|| corrupt("truncated directory record"))?;
        let offset = u32_at(buffer, eocd + 16).ok_or_else(|| corrupt("truncated directory record"))? as usize;

        let mut entries = Vec::with_capacity(count as usize);
        let mut at = offset;
        for _ in 0..count {
            if u32_at(buffer, at) != Some(CENTRAL_SIGNATURE) {
                return Err(corrupt("bad central directory entry"));
            }
            let field = |rel: usize| u16_at(buffer, at + rel).ok_or_else(|| corrupt("truncated entry"));
            let wide = |rel: usize| u32_at(buffer, at + rel).ok_or_else(|| corrupt("truncated entry"));
            let method = field(10)?;
            let compressed_size = wide(20)? as u64;
            let uncompressed_size = wide(24)? as u64;
            let name_len = field(28)? as usize;
            let extra_len = field(30)? as usize;
            let comment_len = field(32)? as usize;
            let local_offset = wide(42)? as u64;
            let name_start = at + CENTRAL_HEADER_LEN;
            let name = buffer
                .get(name_start..name_start + name_len)
                .ok_or_else(|| corrupt("truncated entry name"))?;
            entries.push(Entry {
                name: String::from_utf8_lossy(name).into_owned(),
                method,
                compressed_size,
                uncompressed_size,
                local_offset,
            });
            at = name_start + name_len + extra_len + comment_len;
        }
        Ok(entries)
    }

    fn read_entry(buffer: &[u8], entry: &Entry) -> Result<Vec<u8>, ImportError> {
        let at = entry.local_offset as usize;
        if u32_at(buffer, at) != Some(LOCAL_SIGNATURE) {
            return Err(corrupt("bad local header"));
        }
        let name_len = u16_at(buffer, at + 26).ok_or_else(|| corrupt("truncated local header"))? as usize;
        let extra_len = u16_at(buffer, at + 28).ok_or_else(|| corrupt("truncated local header"))? as usize;
        let start = at + LOCAL_HEADER_LEN + name_len + extra_len;
        let data = buffer
            .get(start..start + entry.compressed_size as usize)
            .ok_or_else(|| corrupt("entry data out of bounds"))?;

        if entry.uncompressed_size > MAX_ENTRY_SIZE {
            return Err(ImportError::Container(format!("entry {} is too large", entry.name)));
        }
        match entry.method {
            METHOD_STORED => Ok(data.to_vec()),
            METHOD_DEFLATE => {
                let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
                DeflateDecoder::new(data)
                    .take(MAX_ENTRY_SIZE)
                    .read_to_end(&mut out)
                    .map_err(|e| ImportError::Container(format!("cannot inflate {}: {}", entry.name, e)))?;
                Ok(out)
            }
            other => Err(ImportError::Container(format!(
                "entry {} uses unsupported compression method {}",
                entry.name, other
            ))),
        }
    }
}

impl ContainerExtractor for MinimalZipReader {
    fn extract_named_entry(&self, buffer: &[u8], name: &str) -> Result<Option<Vec<u8>>, ImportError> {
        if !buffer.starts_with(ZIP_MAGIC) {
            return Err(ImportError::InvalidSignature { container: "ZIP" });
        }
        let entries = Self::entries(buffer)?;
        match entries.iter().find(|e| e.name == name) {
            Some(entry) => Self::read_entry(buffer, entry).map(Some),
            None => Ok(None),
        }
    }
}

/// Test helper: a ZIP archive holding the given entries, deflated.
#[cfg(test)]
pub(crate) fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    let mut out = Vec::new();
    let mut central = Vec::new();
    for (name, data) in files {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        let compressed = encoder.finish().unwrap();
        let offset = out.len() as u32;

        out.extend_from_slice(&LOCAL_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&[20, 0, 0, 0]);
        out.extend_from_slice(&METHOD_DEFLATE.to_le_bytes());
        out.extend_from_slice(&[0; 8]); // time, date, crc (unchecked)
        out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&compressed);

        central.extend_from_slice(&CENTRAL_SIGNATURE.to_le_bytes());
        central.extend_from_slice(&[20, 0, 20, 0, 0, 0]);
        central.extend_from_slice(&METHOD_DEFLATE.to_le_bytes());
        central.extend_from_slice(&[0; 8]);
        central.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0; 12]); // extra, comment, disk, attrs
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
    }
    let central_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&EOCD_SIGNATURE.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&central_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_deflated_entry() {
        let zip = build_zip(&[("a.txt", b"first"), ("word/document.xml", b"<w:document/>")]);
        let reader = MinimalZipReader;
        let data = reader.extract_named_entry(&zip, "word/document.xml").unwrap();
        assert_eq!(data.as_deref(), Some(&b"<w:document/>"[..]));
        assert_eq!(reader.extract_named_entry(&zip, "missing.xml").unwrap(), None);
    }

    #[test]
    fn test_rejects_bad_signature() {
        let err = MinimalZipReader.extract_named_entry(b"not a zip", "x").unwrap_err();
        assert!(matches!(err, ImportError::InvalidSignature { container: "ZIP" }));
    }

    #[test]
    fn test_truncated_archive_is_an_error() {
        let zip = build_zip(&[("a.txt", b"content")]);
        let truncated = &zip[..zip.len() - 10];
        assert!(MinimalZipReader.extract_named_entry(truncated, "a.txt").is_err());
    }
}
