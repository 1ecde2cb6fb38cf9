//! Birth date extraction.
//!
//! Documents are full of dates (issue, expiry, first license), so there is no
//! unanchored fallback here. An unlabeled date is not good evidence of a
//! birth date.

use std::sync::LazyLock;

use regex::Regex;

use super::{FieldContext, FieldRule, same_or_next_line};
use crate::document::compact_date;

static SLASHED_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{2}/\d{2}/\d{4}").expect("failed to compile regex"));

static COMPACT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{8}\b").expect("failed to compile regex"));

/// `NASC` also matches `NASCIMENTO` and abbreviations like `DT. NASC.`.
const LABEL: &str = "NASC";

pub(super) const RULES: &[FieldRule<String>] = &[anchored];

/// Undo the OCR confusions we see most often in numeric fields.
fn fix_digit_typos(s: &str) -> String {
    s.replace(['O', 'o'], "0")
}

/// Find a date in `DD/MM/YYYY` form, or an unseparated `DDMMYYYY` run.
fn find_in(s: &str) -> Option<String> {
    let fixed = fix_digit_typos(s);
    if let Some(m) = SLASHED_DATE_RE.find(&fixed) {
        return Some(m.as_str().to_owned());
    }
    COMPACT_DATE_RE
        .find_iter(&fixed)
        .find_map(|m| compact_date(m.as_str()))
}

fn anchored(ctx: &FieldContext<'_>) -> Option<String> {
    ctx.text.upper_lines().find_map(|(idx, line)| {
        if line.contains(LABEL) {
            same_or_next_line(ctx.text, idx, &line, find_in)
        } else {
            None
        }
    })
}
