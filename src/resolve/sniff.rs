// src/resolve/sniff.rs
use encoding_rs::{Encoding, WINDOWS_1252};
use once_cell::sync::Lazy;
use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use serde::Serialize;
use std::io::Cursor;
use zip::ZipArchive;

use crate::document::ClaimedFormat;

/// How many leading bytes/chars are inspected when sniffing.
pub const SNIFF_WINDOW: usize = 8192;

const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*(!doctype|html|head|body|table|thead|tbody|tr|td|th|div|meta|style)[\s>/]")
        .expect("markup tag pattern is valid")
});

static META_CHARSET: Lazy<BytesRegex> = Lazy::new(|| {
    BytesRegex::new(r#"(?i-u)<meta[^>]*charset\s*=\s*["']?([A-Za-z0-9_.:-]+)"#)
        .expect("meta charset pattern is valid")
});

/// What the bytes actually look like, independent of any claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectedFormat {
    Markup,
    /// Office Open XML workbook (xlsx/xlsm).
    Ooxml,
    OpenDocument,
    /// A zip that is neither of the above (or is corrupt).
    Zip,
    /// OLE2 compound file, i.e. legacy `.xls`.
    Ole,
    Unknown,
}

impl DetectedFormat {
    pub fn agrees_with(&self, claim: ClaimedFormat) -> bool {
        matches!(
            (self, claim),
            (DetectedFormat::Markup, ClaimedFormat::Markup)
                | (DetectedFormat::Ole, ClaimedFormat::LegacySpreadsheet)
                | (DetectedFormat::Ooxml, ClaimedFormat::ModernSpreadsheet)
                | (DetectedFormat::OpenDocument, ClaimedFormat::ModernSpreadsheet)
        )
    }
}

pub fn sniff(content: &[u8]) -> DetectedFormat {
    if content.starts_with(OLE_MAGIC) {
        return DetectedFormat::Ole;
    }
    if content.starts_with(ZIP_MAGIC) {
        return sniff_zip(content);
    }
    match decode_text(content) {
        Some(text) if looks_like_markup(&text) => DetectedFormat::Markup,
        _ => DetectedFormat::Unknown,
    }
}

fn sniff_zip(content: &[u8]) -> DetectedFormat {
    let Ok(archive) = ZipArchive::new(Cursor::new(content)) else {
        return DetectedFormat::Zip;
    };
    let mut ooxml = false;
    let mut ods = false;
    for name in archive.file_names() {
        match name {
            "xl/workbook.xml" | "xl/workbook.bin" => ooxml = true,
            "content.xml" => ods = true,
            _ => {}
        }
    }
    if ooxml {
        DetectedFormat::Ooxml
    } else if ods {
        DetectedFormat::OpenDocument
    } else {
        DetectedFormat::Zip
    }
}

/// Decode bytes as text: BOM-tagged UTF-16/UTF-8 first, then plain UTF-8,
/// then the page's `<meta charset>`, then windows-1252. Returns `None` for
/// content that is clearly binary.
pub fn decode_text(content: &[u8]) -> Option<String> {
    if let Some(rest) = content.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = content.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    let body = content.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(content);
    let window = &body[..body.len().min(SNIFF_WINDOW)];
    if window.contains(&0) {
        return None;
    }
    match std::str::from_utf8(body) {
        Ok(s) => Some(s.to_string()),
        Err(_) => {
            let encoding = declared_charset(window).unwrap_or(WINDOWS_1252);
            let (text, _) = encoding.decode_without_bom_handling(body);
            Some(text.into_owned())
        }
    }
}

fn declared_charset(window: &[u8]) -> Option<&'static Encoding> {
    let label = META_CHARSET.captures(window)?.get(1)?;
    Encoding::for_label(label.as_bytes()).filter(|e| e.is_ascii_compatible())
}

fn decode_utf16(bytes: &[u8], word: fn([u8; 2]) -> u16) -> Option<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| word([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// True when the leading window of `text` carries an HTML element tag.
pub fn looks_like_markup(text: &str) -> bool {
    let end = text
        .char_indices()
        .nth(SNIFF_WINDOW)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    MARKUP_TAG.is_match(&text[..end])
}
