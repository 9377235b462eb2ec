//! GS1 marking code normalization.
//!
//! Codes arrive from scanners, vendor files and the OMS with the Group
//! Separator (ASCII 0x1D) spelled in many ways. Storage always uses
//! [`GS_MARKER`]; submission to the server uses the part before the first
//! separator (see [`server_code`]).

use crate::error::OmsError;

/// Canonical textual form of the GS1 Group Separator in stored codes.
pub const GS_MARKER: &str = "<GS>";

/// Every spelling of 0x1D seen in the wild. Double-escaped forms come first
/// so their inner single-escaped form is not matched on its own.
const GS_ENCODINGS: &[&str] = &[
    "\\\\u001d",
    "\\\\u001D",
    "\\\\x1d",
    "\\\\x1D",
    "\\u001d",
    "\\u001D",
    "\\x{1d}",
    "\\x{1D}",
    "\\x1d",
    "\\x1D",
    "<gs>",
    "{GS}",
    "{gs}",
    "[GS]",
    "[gs]",
    "^]",
    "\u{241d}",
    "\u{1d}",
];

/// AIM symbology identifiers scanners put in front of the data.
const SYMBOLOGY_PREFIXES: &[&str] = &["]d2", "]C1", "]Q3", "]e0"];

/// Bring a raw code into its stored form. Idempotent.
pub fn normalize_code(raw: &str) -> String {
    let mut code = raw.trim().to_string();
    for encoding in GS_ENCODINGS {
        if code.contains(encoding) {
            code = code.replace(encoding, GS_MARKER);
        }
    }

    let mut rest = code.trim_start();
    loop {
        let before = rest.len();
        if let Some(prefix) = SYMBOLOGY_PREFIXES.iter().find(|p| rest.starts_with(**p)) {
            rest = &rest[prefix.len()..];
        }
        // A leading separator is FNC1, not data.
        rest = rest.strip_prefix(GS_MARKER).unwrap_or(rest).trim_start();
        if rest.len() == before {
            break;
        }
    }
    rest.trim_end().to_string()
}

/// The part of a code the OMS expects: everything before the first separator.
pub fn server_code(raw: &str) -> String {
    let code = normalize_code(raw);
    match code.split_once(GS_MARKER) {
        Some((head, _)) => head.to_string(),
        None => code,
    }
}

/// GTIN and serial number read from a marking code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gs1Code {
    pub gtin: String,
    pub serial: String,
}

/// Read AI 01 (GTIN-14) and AI 21 (serial) from the head of a code.
pub fn parse_code(raw: &str) -> Result<Gs1Code, OmsError> {
    let head = server_code(raw);
    let invalid = |reason: &str| OmsError::Validation(format!("code {head:?}: {reason}"));

    let rest = head
        .strip_prefix("01")
        .ok_or_else(|| invalid("missing AI 01"))?;
    let gtin = rest.get(..14).ok_or_else(|| invalid("truncated GTIN"))?;
    if !is_valid_gtin(gtin) {
        return Err(invalid("bad GTIN check digit"));
    }
    let serial = rest[14..]
        .strip_prefix("21")
        .ok_or_else(|| invalid("missing AI 21"))?;
    if serial.is_empty() {
        return Err(invalid("empty serial"));
    }

    Ok(Gs1Code {
        gtin: gtin.to_string(),
        serial: serial.to_string(),
    })
}

/// 14 digits with a valid GS1 mod-10 check digit.
pub fn is_valid_gtin(gtin: &str) -> bool {
    if gtin.len() != 14 || !gtin.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u32> = gtin.bytes().map(|b| u32::from(b - b'0')).collect();
    let sum: u32 = digits[..13]
        .iter()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d * 3 } else { *d })
        .sum();
    (10 - sum % 10) % 10 == digits[13]
}
