//! Hex framing
//!
//! Devices on the rig push raw byte chunks with no length prefix or delimiter.
//! Each received chunk is rendered as space-separated uppercase hex and then
//! classified; outbound hex payloads are decoded back to bytes here.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Classification of a received chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// Hex digits and spaces only
    Binary,
    /// Anything else, handled as UTF-8 text
    Text,
}

impl FrameKind {
    pub fn is_hex(self) -> bool {
        matches!(self, FrameKind::Binary)
    }
}

/// Render bytes as uppercase hex, one space between bytes
/// Example: [0x48, 0x3A, 0x01] -> "48 3A 01"
pub fn to_hex(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            result.push(' ');
        }
        // Writing to String buffer is infallible
        let _ = write!(&mut result, "{:02X}", byte);
    }
    result
}

/// Classify a string as a binary (hex) frame or text.
///
/// A string is `Binary` iff it is non-empty and every character is an ASCII
/// hex digit or a space. The empty string is `Text`.
pub fn classify(s: &str) -> FrameKind {
    if s.is_empty() {
        return FrameKind::Text;
    }
    if s.chars().all(|ch| ch.is_ascii_hexdigit() || ch == ' ') {
        FrameKind::Binary
    } else {
        FrameKind::Text
    }
}

/// Decode hex text to bytes. Spaces are ignored, case is not significant.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = s.bytes().filter(|b| *b != b' ').collect();
    if digits.len() % 2 != 0 {
        return Err(ProtocolError::InvalidHex(format!(
            "odd number of hex digits ({})",
            digits.len()
        )));
    }

    digits
        .chunks_exact(2)
        .map(|pair| Ok((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

fn nibble(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(ProtocolError::InvalidHex(format!(
            "invalid character {:?}",
            char::from(c)
        ))),
    }
}
