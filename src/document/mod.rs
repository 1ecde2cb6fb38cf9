//! Structured records extracted from identity documents.
//!
//! Everything here is a pure function of OCR text. The image and OCR plumbing
//! lives elsewhere; this module only knows how to turn noisy text into an
//! [`ExtractedRecord`] and how much to trust it.

use std::fmt;

use schemars::JsonSchema;

use crate::prelude::*;

pub mod parse;
pub mod score;
pub mod text;

pub use self::{
    parse::parse_document_text,
    score::{ScoreWeights, score_record},
    text::NormalizedText,
};

/// The kind of document we think we're looking at.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize,
)]
pub enum DocumentType {
    /// Driver's license (Carteira Nacional de Habilitação).
    #[serde(rename = "CNH")]
    Cnh,

    /// National identity card (Registro Geral).
    #[serde(rename = "RG")]
    Rg,

    /// We couldn't tell.
    #[default]
    #[serde(rename = "UNKNOWN", alias = "DESCONHECIDO")]
    Unknown,
}

impl DocumentType {
    /// Parse a loosely-formatted document type, as returned by external
    /// services. Anything unrecognized is [`DocumentType::Unknown`].
    pub fn from_loose_str(s: &str) -> Self {
        let upper = s.trim().to_uppercase();
        if upper.contains("CNH") || upper.contains("HABILITA") {
            DocumentType::Cnh
        } else if upper == "RG" || upper.contains("IDENTIDADE") {
            DocumentType::Rg
        } else {
            DocumentType::Unknown
        }
    }

    /// Did we actually figure out what this document is?
    pub fn is_known(self) -> bool {
        self != DocumentType::Unknown
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentType::Cnh => write!(f, "CNH"),
            DocumentType::Rg => write!(f, "RG"),
            DocumentType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Identity fields extracted from a document.
///
/// Missing fields are `None`, never an empty string.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    /// Taxpayer ID (CPF), formatted as `NNN.NNN.NNN-NN` when we recovered
    /// exactly 11 digits, or the raw match otherwise.
    pub tax_id: Option<String>,

    /// Birth date, formatted as `DD/MM/YYYY`.
    pub birth_date: Option<String>,

    /// Registry or identity number, as an unformatted digit string.
    pub registry_id: Option<String>,

    /// Our best guess at the holder's full name, in upper case.
    pub likely_name: Option<String>,

    /// What kind of document this is.
    #[serde(default)]
    pub document_type: DocumentType,
}

impl ExtractedRecord {
    /// Do we have both a tax ID and a name? We treat this combination as
    /// proof that we read the document correctly.
    pub fn is_gold(&self) -> bool {
        self.tax_id.is_some() && self.likely_name.is_some()
    }

    /// Is every field unset?
    pub fn is_empty(&self) -> bool {
        self.tax_id.is_none()
            && self.birth_date.is_none()
            && self.registry_id.is_none()
            && self.likely_name.is_none()
            && !self.document_type.is_known()
    }
}

/// Keep only the ASCII digits in a string.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Format a tax ID as `NNN.NNN.NNN-NN`.
///
/// If `raw` doesn't contain exactly 11 digits, we return it unchanged rather
/// than throw away a partial match.
pub fn format_tax_id(raw: &str) -> String {
    let digits = digits_only(raw);
    if digits.len() != 11 {
        return raw.to_owned();
    }
    format!(
        "{}.{}.{}-{}",
        &digits[..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..]
    )
}

/// Are these two strings the same number, ignoring separators?
pub fn is_same_number(a: &str, b: &str) -> bool {
    let a = digits_only(a);
    !a.is_empty() && a == digits_only(b)
}

/// If `s` is exactly eight digits that look like `DDMMYYYY`, return it as
/// `DD/MM/YYYY`.
pub fn compact_date(s: &str) -> Option<String> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day: u32 = s[..2].parse().ok()?;
    let month: u32 = s[2..4].parse().ok()?;
    let year: u32 = s[4..].parse().ok()?;
    if (1..=31).contains(&day) && (1..=12).contains(&month) && (1900..=2099).contains(&year)
    {
        Some(format!("{}/{}/{}", &s[..2], &s[2..4], &s[4..]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tax_id_is_idempotent() {
        let formatted = format_tax_id("12345678909");
        assert_eq!(formatted, "123.456.789-09");
        assert_eq!(format_tax_id(&formatted), formatted);
    }

    #[test]
    fn format_tax_id_keeps_partial_matches() {
        assert_eq!(format_tax_id("123.456.789"), "123.456.789");
    }

    #[test]
    fn compact_date_accepts_plausible_dates() {
        assert_eq!(compact_date("19091981").as_deref(), Some("19/09/1981"));
        assert_eq!(compact_date("01012000").as_deref(), Some("01/01/2000"));
    }

    #[test]
    fn compact_date_rejects_implausible_dates() {
        assert_eq!(compact_date("32011990"), None);
        assert_eq!(compact_date("15131990"), None);
        assert_eq!(compact_date("15011850"), None);
        assert_eq!(compact_date("1501199"), None);
        assert_eq!(compact_date("1501199A"), None);
    }

    #[test]
    fn same_number_ignores_separators() {
        assert!(is_same_number("123.456.789-09", "12345678909"));
        assert!(!is_same_number("12345678909", "12345678900"));
        assert!(!is_same_number("", ""));
    }

    #[test]
    fn document_type_names() {
        assert_eq!(
            serde_json::to_value(DocumentType::Unknown).unwrap(),
            json!("UNKNOWN")
        );
        assert_eq!(
            serde_json::from_value::<DocumentType>(json!("DESCONHECIDO")).unwrap(),
            DocumentType::Unknown
        );
        assert_eq!(DocumentType::from_loose_str("cnh"), DocumentType::Cnh);
        assert_eq!(DocumentType::from_loose_str(" RG "), DocumentType::Rg);
        assert_eq!(DocumentType::from_loose_str("passport"), DocumentType::Unknown);
    }

    #[test]
    fn empty_record_serializes_nulls() {
        let value = serde_json::to_value(ExtractedRecord::default()).unwrap();
        assert_eq!(
            value,
            json!({
                "taxId": null,
                "birthDate": null,
                "registryId": null,
                "likelyName": null,
                "documentType": "UNKNOWN",
            })
        );
    }
}
