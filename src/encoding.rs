//! Single-byte text handling.
//!
//! Every artifact in the pipeline is treated as ISO-8859-1: each byte maps to
//! exactly one character, so arbitrary bytes 0-255 survive a decode/encode
//! round trip and nothing ever fails on non-ASCII input.

use std::borrow::Cow;

/// Decode a Latin-1 field to text.
pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    encoding_rs::mem::decode_latin1(bytes)
}

/// Encode text produced by [`decode`] (or any string restricted to
/// U+0000..=U+00FF) back to Latin-1 bytes.
pub fn encode(text: &str) -> Cow<'_, [u8]> {
    encoding_rs::mem::encode_latin1_lossy(text)
}

/// Locale-invariant uppercase of a Latin-1 field.
///
/// Characters whose uppercase form is not a single Latin-1 character
/// (`ß`, `ÿ`, `µ`) are left unchanged so the result stays encodable and the
/// mapping stays idempotent.
pub fn uppercase(bytes: &[u8]) -> Vec<u8> {
    if bytes.is_ascii() {
        return bytes.to_ascii_uppercase();
    }
    let upper: String = decode(bytes).chars().map(uppercase_char).collect();
    encode(&upper).into_owned()
}

fn uppercase_char(c: char) -> char {
    let mut mapped = c.to_uppercase();
    match (mapped.next(), mapped.next()) {
        (Some(u), None) if (u as u32) <= 0xFF => u,
        _ => c,
    }
}
