//! Anchor-based field extraction.
//!
//! Each field is described by an ordered list of [`FieldRule`]s. We try them
//! in order and keep the first value found. Most fields start with an
//! "anchored" rule, which only looks near a label like `CPF` or `NOME`, and
//! fall back to an unanchored scan of the whole text. Anchoring cuts down on
//! false positives from serial numbers, expiry dates and similar noise.

use super::{ExtractedRecord, NormalizedText};

mod birth_date;
mod document_type;
mod name;
mod registry_id;
mod tax_id;

pub use self::name::is_valid_name;

/// Everything a field rule gets to look at.
pub struct FieldContext<'a> {
    /// The normalized OCR text.
    pub text: &'a NormalizedText,

    /// The tax ID, if we've already found it. Registry ID rules use this to
    /// avoid returning the tax ID a second time.
    pub tax_id: Option<&'a str>,
}

/// A single strategy for extracting a field.
pub type FieldRule<T> = fn(&FieldContext<'_>) -> Option<T>;

/// Run `rules` in order, returning the first hit.
fn first_match<T>(ctx: &FieldContext<'_>, rules: &[FieldRule<T>]) -> Option<T> {
    rules.iter().find_map(|rule| rule(ctx))
}

/// Look at an anchor line and the line after it, returning the first value
/// `extract` finds.
fn same_or_next_line<T>(
    text: &NormalizedText,
    idx: usize,
    same_line: &str,
    extract: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    extract(same_line).or_else(|| {
        text.upper_line(idx + 1)
            .and_then(|next_line| extract(&next_line))
    })
}

/// Parse raw OCR text into an [`ExtractedRecord`].
///
/// This is deterministic: the same text always produces the same record.
pub fn parse_document_text(raw_text: &str) -> ExtractedRecord {
    let text = NormalizedText::new(raw_text);
    parse_normalized(&text)
}

/// Parse already-normalized text.
pub fn parse_normalized(text: &NormalizedText) -> ExtractedRecord {
    let mut ctx = FieldContext { text, tax_id: None };

    let document_type = document_type::detect(text);

    // The tax ID must be resolved before the registry ID, which excludes it.
    let tax_id = first_match(&ctx, tax_id::RULES);
    ctx.tax_id = tax_id.as_deref();

    let birth_date = first_match(&ctx, birth_date::RULES);
    let registry_id = first_match(&ctx, registry_id::RULES);
    let likely_name = first_match(&ctx, name::RULES);

    ExtractedRecord {
        tax_id,
        birth_date,
        registry_id,
        likely_name,
        document_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentType;

    #[test]
    fn parses_tax_id_and_name_across_blank_lines() {
        let record = parse_document_text("CPF 123.456.789-09\n\nNOME\nMARIA DA SILVA\n");
        assert_eq!(record.tax_id.as_deref(), Some("123.456.789-09"));
        assert_eq!(record.likely_name.as_deref(), Some("MARIA DA SILVA"));
        assert_eq!(record.registry_id, None);
        assert_eq!(record.birth_date, None);
        assert_eq!(record.document_type, DocumentType::Unknown);
    }

    #[test]
    fn unlabeled_digit_noise_yields_empty_record() {
        let record = parse_document_text("0193847561029384756102938\n");
        assert!(record.is_empty());
        assert_eq!(record.document_type, DocumentType::Unknown);
    }

    #[test]
    fn parses_typical_driver_license() {
        let text = "\
REPUBLICA FEDERATIVA DO BRASIL
MINISTERIO DAS CIDADES
CARTEIRA NACIONAL DE HABILITACAO
NOME
JOSE CARLOS PEREIRA
DOC. IDENTIDADE / ORG. EMISSOR / UF
12345678 SSP SP
CPF DATA NASCIMENTO
987.654.321-00 19/09/1981
FILIACAO
ANTONIO PEREIRA
N REGISTRO VALIDADE
04567891234 10/10/2030
";
        let record = parse_document_text(text);
        assert_eq!(record.document_type, DocumentType::Cnh);
        assert_eq!(record.tax_id.as_deref(), Some("987.654.321-00"));
        assert_eq!(record.likely_name.as_deref(), Some("JOSE CARLOS PEREIRA"));
        assert_eq!(record.birth_date.as_deref(), Some("19/09/1981"));
        assert_eq!(record.registry_id.as_deref(), Some("12345678"));
    }

    #[test]
    fn parses_typical_identity_card() {
        let text = "\
SECRETARIA DA SEGURANCA PUBLICA
CARTEIRA DE IDENTIDADE
REGISTRO GERAL 3O.123.456 DATA DE EXPEDICAO 01/02/2015
NOME ANA PAULA SOUZA
DATA DE NASCIMENTO
O5/O3/199O
CPF
111.222.333-44
";
        let record = parse_document_text(text);
        assert_eq!(record.document_type, DocumentType::Rg);
        assert_eq!(record.tax_id.as_deref(), Some("111.222.333-44"));
        assert_eq!(record.birth_date.as_deref(), Some("05/03/1990"));
        assert_eq!(record.likely_name.as_deref(), Some("ANA PAULA SOUZA"));
    }

    #[test]
    fn parsing_is_deterministic() {
        let text = "CNH\nNOME\nMARIA DA SILVA\nCPF 12345678909\n";
        assert_eq!(parse_document_text(text), parse_document_text(text));
    }
}
