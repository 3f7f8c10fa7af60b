//! Leading-byte classification for inputs that are not compound files
//!
//! When a load fails the signature check, callers usually want to know what
//! they were handed instead: an OOXML package, raw XML, an HTML page, or one
//! of the pre-OLE2 binary office formats. Detection is best effort and only
//! ever looks at the first few bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compound file signature (`D0 CF 11 E0 A1 B1 1A E1`)
pub const COMPOUND_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Known formats, by their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileMagic {
    /// OLE2 / CFBF container
    Compound,
    /// Zip archive (OOXML package: docx, xlsx, pptx)
    Ooxml,
    /// XML text
    Xml,
    /// HTML text
    Html,
    /// Rich Text Format
    Rtf,
    /// PDF document
    Pdf,
    /// BIFF2, BIFF3 or BIFF4 spreadsheet (pre-OLE2 Excel)
    Biff,
    /// Word 2 binary document
    Word2,
    /// MS Write binary document
    MsWrite,
    /// Printable text with no recognised markup
    PlainText,
    /// No bytes at all
    Empty,
    /// Anything else
    Unknown,
}

impl FileMagic {
    /// Classify a byte prefix
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return FileMagic::Empty;
        }
        if bytes.starts_with(&COMPOUND_SIGNATURE) {
            return FileMagic::Compound;
        }
        if bytes.starts_with(b"PK\x03\x04") {
            return FileMagic::Ooxml;
        }
        if bytes.starts_with(b"%PDF") {
            return FileMagic::Pdf;
        }
        if bytes.starts_with(b"{\\rtf") {
            return FileMagic::Rtf;
        }
        if bytes.starts_with(&[0xDB, 0xA5, 0x2D, 0x00]) {
            return FileMagic::Word2;
        }
        if bytes.starts_with(&[0x31, 0xBE, 0x00, 0x00]) || bytes.starts_with(&[0x32, 0xBE, 0x00, 0x00]) {
            return FileMagic::MsWrite;
        }
        // BIF2/BIF3/BIF4 BOF records: opcode 0x0009/0x0209/0x0409, then a small length
        if bytes.len() >= 4
            && matches!(&bytes[0..2], [0x09, 0x00] | [0x09, 0x02] | [0x09, 0x04])
            && matches!(&bytes[2..4], [0x04, 0x00] | [0x06, 0x00])
        {
            return FileMagic::Biff;
        }

        let text = Self::strip_bom(bytes);
        let head = Self::text_head(text);
        if head.starts_with("<?xml") {
            return FileMagic::Xml;
        }
        if head.starts_with("<!doctype html") || head.starts_with("<html") {
            return FileMagic::Html;
        }
        if head.starts_with('<') {
            return FileMagic::Xml;
        }
        if !text.is_empty()
            && text
                .iter()
                .take(512)
                .all(|&b| b == b'\t' || b == b'\n' || b == b'\r' || (0x20..0x7F).contains(&b) || b >= 0x80)
        {
            return FileMagic::PlainText;
        }

        FileMagic::Unknown
    }

    fn strip_bom(bytes: &[u8]) -> &[u8] {
        bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
    }

    /// Lowercased first characters after leading whitespace
    fn text_head(bytes: &[u8]) -> String {
        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        let end = (start + 16).min(bytes.len());
        String::from_utf8_lossy(&bytes[start..end]).to_ascii_lowercase()
    }
}

impl fmt::Display for FileMagic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileMagic::Compound => "a compound file",
            FileMagic::Ooxml => "an OOXML (zip) package",
            FileMagic::Xml => "raw XML",
            FileMagic::Html => "an HTML document",
            FileMagic::Rtf => "an RTF document",
            FileMagic::Pdf => "a PDF document",
            FileMagic::Biff => "a BIFF2-4 spreadsheet",
            FileMagic::Word2 => "a Word 2 document",
            FileMagic::MsWrite => "an MS Write document",
            FileMagic::PlainText => "plain text",
            FileMagic::Empty => "an empty input",
            FileMagic::Unknown => "an unknown format",
        };
        f.write_str(name)
    }
}

/// Whether `bytes` begins with the compound file signature
pub fn has_compound_header(bytes: &[u8]) -> bool {
    bytes.len() >= COMPOUND_SIGNATURE.len() && bytes[..8] == COMPOUND_SIGNATURE
}
