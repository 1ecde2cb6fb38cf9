//! Registry ID (RG / identity number) extraction.

use std::sync::LazyLock;

use regex::Regex;

use super::{FieldContext, FieldRule, same_or_next_line};
use crate::document::{compact_date, is_same_number};

/// Digit runs near a label.
static ANCHORED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{5,12}\b").expect("failed to compile regex"));

/// Digit runs anywhere. We insist on a few more digits here, because there's
/// no label to vouch for them.
static UNANCHORED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{7,12}\b").expect("failed to compile regex"));

/// `RG` as a standalone word. As a substring it shows up in `ORGAO`, `ORG.`
/// and many names.
static RG_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bRG\b").expect("failed to compile regex"));

/// Labels that specifically mean "identity document number". Driver's
/// licenses use these, and they are less ambiguous than the generic labels.
const SPECIFIC_LABELS: &[&str] = &["DOC. IDENT", "DOC IDENT", "DOC.IDENT"];

/// Generic registry labels.
const GENERIC_LABELS: &[&str] = &["REGISTRO", "IDENTIDADE"];

pub(super) const RULES: &[FieldRule<String>] =
    &[anchored_specific, anchored_generic, unanchored];

/// Is `candidate` a plausible registry ID, given what we already know?
fn is_acceptable(ctx: &FieldContext<'_>, candidate: &str) -> bool {
    let same_as_tax_id = ctx.tax_id.is_some_and(|tax_id| is_same_number(candidate, tax_id));
    !same_as_tax_id && compact_date(candidate).is_none()
}

/// Search near every line matching `is_anchor`.
fn anchored_by(ctx: &FieldContext<'_>, is_anchor: impl Fn(&str) -> bool) -> Option<String> {
    let find_in = |s: &str| {
        ANCHORED_RE
            .find_iter(s)
            .map(|m| m.as_str())
            .find(|candidate| is_acceptable(ctx, candidate))
            .map(str::to_owned)
    };
    ctx.text.upper_lines().find_map(|(idx, line)| {
        // Lines mentioning the tax ID are about the tax ID.
        if is_anchor(&line) && !line.contains("CPF") {
            same_or_next_line(ctx.text, idx, &line, &find_in)
        } else {
            None
        }
    })
}

fn anchored_specific(ctx: &FieldContext<'_>) -> Option<String> {
    anchored_by(ctx, |line| SPECIFIC_LABELS.iter().any(|l| line.contains(l)))
}

fn anchored_generic(ctx: &FieldContext<'_>) -> Option<String> {
    anchored_by(ctx, |line| {
        RG_WORD_RE.is_match(line) || GENERIC_LABELS.iter().any(|l| line.contains(l))
    })
}

fn unanchored(ctx: &FieldContext<'_>) -> Option<String> {
    UNANCHORED_RE
        .find_iter(&ctx.text.upper)
        .map(|m| m.as_str())
        .find(|candidate| is_acceptable(ctx, candidate))
        .map(str::to_owned)
}
