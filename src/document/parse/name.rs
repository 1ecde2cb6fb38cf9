//! Holder name extraction.
//!
//! Names are the hardest field to get right, since almost any line of capital
//! letters could be a name. We lean heavily on a blacklist of words that
//! appear in document headers and labels.

use super::{FieldContext, FieldRule};

/// The label we anchor on.
const LABEL: &str = "NOME";

/// Label text that OCR sometimes glues onto the name itself. Longer labels
/// come first, so `NOME SOCIAL` is stripped before `NOME`.
const LABELS_TO_STRIP: &[&str] = &[
    "NOME SOCIAL",
    "NOME E SOBRENOME",
    "SOBRENOME",
    "NOME",
    "RNTRC",
    "ASSINATURA",
];

/// Header and label words which never appear in a person's name. Compared
/// against whole tokens, after removing accents.
const BLACKLIST: &[&str] = &[
    "ASSINATURA",
    "BRASIL",
    "CARTEIRA",
    "CONDUTOR",
    "CPF",
    "DATA",
    "DETRAN",
    "DOCUMENTO",
    "DRIVER",
    "EMISSOR",
    "ESTADO",
    "EXPEDICAO",
    "FEDERATIVA",
    "FILIACAO",
    "GERAL",
    "HABILITACAO",
    "IDENTIDADE",
    "LICENSE",
    "LOCAL",
    "MINISTERIO",
    "NACIONAL",
    "NASCIMENTO",
    "NOME",
    "PERMISO",
    "REGISTRO",
    "REPUBLICA",
    "SECRETARIA",
    "SOBRENOME",
    "TERRITORIO",
    "VALIDA",
    "VALIDADE",
];

pub(super) const RULES: &[FieldRule<String>] = &[anchored, all_letter_line];

/// Map accented Portuguese capitals to their plain forms.
fn fold_accent(c: char) -> char {
    match c {
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'Ç' => 'C',
        _ => c,
    }
}

/// Upper-case `s`, delete everything except letters and whitespace, and
/// collapse runs of whitespace. A digit inside a word is OCR noise, so it is
/// removed rather than treated as a word break.
fn clean_candidate(s: &str) -> String {
    let letters = s
        .to_uppercase()
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect::<String>();
    letters.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_blacklisted(token: &str) -> bool {
    let folded = token.chars().map(fold_accent).collect::<String>();
    BLACKLIST.contains(&folded.as_str())
}

/// Could `candidate` be a person's name?
///
/// We want at least five letters, at least two words, at least one word
/// longer than two letters, and nothing from our header blacklist.
pub fn is_valid_name(candidate: &str) -> bool {
    let candidate = candidate.trim();
    if candidate.chars().count() < 5 {
        return false;
    }
    let tokens = candidate.split_whitespace().collect::<Vec<_>>();
    tokens.len() >= 2
        && tokens.iter().any(|t| t.chars().count() > 2)
        && !tokens.iter().any(|t| is_blacklisted(t))
}

/// Look near each `NOME` label. Licenses print the name on the line below
/// the label, so we try that before the label's own line.
fn anchored(ctx: &FieldContext<'_>) -> Option<String> {
    ctx.text.upper_lines().find_map(|(idx, line)| {
        if !line.contains(LABEL) {
            return None;
        }

        let next_line = ctx
            .text
            .upper_line(idx + 1)
            .map(|next| clean_candidate(&next))
            .filter(|next| is_valid_name(next));
        next_line.or_else(|| {
            let mut same_line = line.clone();
            for label in LABELS_TO_STRIP {
                same_line = same_line.replace(label, " ");
            }
            Some(clean_candidate(&same_line)).filter(|same| is_valid_name(same))
        })
    })
}

/// Take the first line made up of nothing but letters and spaces that looks
/// like a name.
fn all_letter_line(ctx: &FieldContext<'_>) -> Option<String> {
    ctx.text
        .lines
        .iter()
        .filter(|line| line.chars().all(|c| c.is_alphabetic() || c.is_whitespace()))
        .map(|line| clean_candidate(line))
        .find(|candidate| is_valid_name(candidate))
}
