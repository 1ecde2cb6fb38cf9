//! Document type detection.

use crate::document::{DocumentType, NormalizedText};

/// Words that only show up on driver's licenses. We check these first,
/// because licenses also say things like `REGISTRO`.
const CNH_KEYWORDS: &[&str] = &[
    "HABILITACAO",
    "HABILITAÇÃO",
    "CONDUTOR",
    "CNH",
    "DRIVER",
    "PERMISO",
];

/// Words that show up on generic identity cards.
const RG_KEYWORDS: &[&str] = &["IDENTIDADE", "SSP", "SECRETARIA", "REGISTRO GERAL"];

/// Guess the document type from keywords anywhere in the text.
pub(super) fn detect(text: &NormalizedText) -> DocumentType {
    let contains_any = |keywords: &[&str]| keywords.iter().any(|k| text.upper.contains(k));
    if contains_any(CNH_KEYWORDS) {
        DocumentType::Cnh
    } else if contains_any(RG_KEYWORDS) {
        DocumentType::Rg
    } else {
        DocumentType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect_str(s: &str) -> DocumentType {
        detect(&NormalizedText::new(s))
    }

    #[test]
    fn license_keywords_win_over_identity_keywords() {
        assert_eq!(
            detect_str("Carteira Nacional de Habilitação\nRegistro Geral"),
            DocumentType::Cnh
        );
    }

    #[test]
    fn identity_keywords() {
        assert_eq!(detect_str("SSP/SP\nfoo"), DocumentType::Rg);
        assert_eq!(detect_str("nothing useful"), DocumentType::Unknown);
    }
}
