//! Tax ID (CPF) extraction.

use std::sync::LazyLock;

use regex::Regex;

use super::{FieldContext, FieldRule, same_or_next_line};
use crate::document::format_tax_id;

/// Eleven digits, with optional separators in the usual places.
static TAX_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{3}[.\s]?\d{3}[.\s]?\d{3}[-\s]?\d{2}").expect("failed to compile regex")
});

/// The label we anchor on.
const LABEL: &str = "CPF";

pub(super) const RULES: &[FieldRule<String>] = &[anchored, punctuated_anywhere];

/// Find the first tax ID in `s`.
fn find_in(s: &str) -> Option<String> {
    TAX_ID_RE.find(s).map(|m| format_tax_id(m.as_str()))
}

/// Look for a tax ID on a `CPF` line, or the line right after it.
fn anchored(ctx: &FieldContext<'_>) -> Option<String> {
    ctx.text.upper_lines().find_map(|(idx, line)| {
        if !line.contains(LABEL) {
            return None;
        }
        let without_label = line.replace(LABEL, "");
        same_or_next_line(ctx.text, idx, without_label.trim(), find_in)
    })
}

/// Scan the whole text, but only accept matches with punctuation, so that we
/// don't grab some unrelated run of 11 digits.
fn punctuated_anywhere(ctx: &FieldContext<'_>) -> Option<String> {
    TAX_ID_RE
        .find_iter(&ctx.text.upper)
        .map(|m| m.as_str())
        .find(|m| m.contains('.') || m.contains('-'))
        .map(format_tax_id)
}
