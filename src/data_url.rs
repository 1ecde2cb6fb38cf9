//! Converting between binary data and Base64 payloads, with or without a
//! `data:` URL header.

use base64::{
    DecodeError, Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    prelude::BASE64_STANDARD,
};

/// Standard Base64, but forgiving about missing `=` padding. Browsers and
/// mobile apps are inconsistent about it.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Convert binary data to a `data:` URL.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    let base64_data = BASE64_STANDARD.encode(data);
    format!("data:{};base64,{}", mime_type, base64_data)
}

/// Decode a Base64 payload, which may be prefixed by a `data:` URL header.
///
/// Base64 never contains a comma, so everything up to the first comma is
/// header. Embedded whitespace and line breaks are ignored.
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let encoded = match payload.split_once(',') {
        Some((_header, encoded)) => encoded,
        None => payload,
    };
    let compact = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect::<String>();
    LENIENT_BASE64.decode(compact)
}
