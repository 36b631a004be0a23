//! PDF text strings and single-byte encodings

use lopdf::{Object, StringFormat};

/// PDFDocEncoding code points 0x80..=0xA0 that differ from Latin-1.
const PDF_DOC_HIGH: [char; 33] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}',
    '\u{2044}', '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}',
    '\u{201D}', '\u{2018}', '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}',
    '\u{0141}', '\u{0152}', '\u{0160}', '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}',
    '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}', '\u{20AC}',
];

/// WinAnsiEncoding code points 0x80..=0x9F.
const WIN_ANSI_HIGH: [char; 32] = [
    '\u{20AC}', '\u{FFFD}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}',
    '\u{2021}', '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{FFFD}',
    '\u{017D}', '\u{FFFD}', '\u{FFFD}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}',
    '\u{2022}', '\u{2013}', '\u{2014}', '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}',
    '\u{0153}', '\u{FFFD}', '\u{017E}', '\u{0178}',
];

/// Decodes a text string (PDFDocEncoding, UTF-16BE or UTF-8 with BOM).
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0xA0 => PDF_DOC_HIGH[(b - 0x80) as usize],
            _ => char::from(b),
        })
        .collect()
}

/// Encodes a text string object, using PDFDocEncoding when every character
/// fits and UTF-16BE otherwise.
pub(crate) fn encode_text_string(text: &str) -> Object {
    let single_byte: Option<Vec<u8>> = text.chars().map(pdf_doc_byte).collect();
    let bytes = match single_byte {
        Some(bytes) => bytes,
        None => {
            let mut bytes = vec![0xFE, 0xFF];
            for unit in text.encode_utf16() {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
            bytes
        }
    };
    Object::String(bytes, StringFormat::Literal)
}

/// Text from a string object, if `obj` is one.
pub(crate) fn text_of(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

/// Bytes to show with a WinAnsiEncoding font; unmappable characters become `?`.
pub(crate) fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            _ => WIN_ANSI_HIGH
                .iter()
                .position(|&w| w == c && w != '\u{FFFD}')
                .map(|i| 0x80 + i as u8)
                .unwrap_or(b'?'),
        })
        .collect()
}

fn pdf_doc_byte(c: char) -> Option<u8> {
    match c as u32 {
        0x09 | 0x0A | 0x0D | 0x20..=0x7E | 0xA1..=0xFF => Some(c as u32 as u8),
        _ => PDF_DOC_HIGH
            .iter()
            .position(|&p| p == c && p != '\u{FFFD}')
            .map(|i| 0x80 + i as u8),
    }
}
