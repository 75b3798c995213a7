//! Type/length encoded fields.
//!
//! Each field starts with a type/length byte: bits 7:6 select the encoding
//! and bits 5:0 give the number of data bytes that follow. `0xC1` is the
//! end-of-fields marker.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// End-of-fields marker.
pub const END_OF_FIELDS: u8 = 0xC1;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FruField {
    /// Binary or unspecified data.
    Binary(Vec<u8>),
    /// Text decoded from BCD plus, packed 6-bit ASCII or 8-bit ASCII.
    Text(String),
}

impl FruField {
    /// The text, if this is a text field.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    /// Whether the field carries no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Binary(b) => b.is_empty(),
        }
    }
}

impl Default for FruField {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl fmt::Display for FruField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Binary(bytes) => {
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

fn decode_bcd_plus(data: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789 -.???";
    data.iter()
        .flat_map(|b| [b >> 4, b & 0xF])
        .map(|n| char::from(DIGITS[usize::from(n)]))
        .collect()
}

/// Four characters per three bytes, least significant bits first, each
/// character offset from `0x20`.
fn decode_6bit(data: &[u8]) -> String {
    let mut out = String::new();
    let mut acc: u32 = 0;
    let mut bits = 0;
    for &byte in data {
        acc |= u32::from(byte) << bits;
        bits += 8;
        while bits >= 6 {
            out.push(char::from(0x20 + (acc & 0x3F) as u8));
            acc >>= 6;
            bits -= 6;
        }
    }
    out
}

fn decode_8bit(data: &[u8]) -> String {
    let text: String = data.iter().map(|&b| char::from(b)).collect();
    String::from(text.trim_end_matches(['\0', ' ']))
}

/// Reads the field at the start of `data`.
///
/// Returns the field and the number of bytes consumed, or `None` at the
/// end marker or when the field overruns `data`.
#[must_use]
pub fn read_field(data: &[u8]) -> Option<(FruField, usize)> {
    let &tl = data.first()?;
    if tl == END_OF_FIELDS {
        return None;
    }
    let len = usize::from(tl & 0x3F);
    let body = data.get(1..=len)?;
    let field = match tl >> 6 {
        0b00 => FruField::Binary(body.to_vec()),
        0b01 => FruField::Text(decode_bcd_plus(body)),
        0b10 => FruField::Text(decode_6bit(body)),
        _ => FruField::Text(decode_8bit(body)),
    };
    Some((field, len + 1))
}

/// Cursor over consecutive fields of an area.
pub(crate) struct Fields<'a> {
    data: &'a [u8],
}

impl<'a> Fields<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// The next fixed field, or an empty one once the fields run out.
    pub(crate) fn next_or_empty(&mut self) -> FruField {
        self.next().unwrap_or_default()
    }
}

impl Iterator for Fields<'_> {
    type Item = FruField;

    fn next(&mut self) -> Option<Self::Item> {
        let (field, used) = read_field(self.data)?;
        self.data = &self.data[used..];
        Some(field)
    }
}

/// Encodes `text` as an 8-bit ASCII field. Text longer than 63 bytes is
/// truncated.
#[must_use]
pub fn encode_ascii(text: &str) -> Vec<u8> {
    let bytes = &text.as_bytes()[..text.len().min(0x3F)];
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(0xC0 | bytes.len() as u8);
    out.extend_from_slice(bytes);
    out
}
