//! Pure normalizers that turn noisy page text into canonical scalars.
//!
//! All functions are total: unparseable input yields `None`, never a panic.

use crate::models::{Scalar, ScalarKind};

/// First unsigned integer run in `text` ("4 bedrooms" -> 4).
pub fn to_count(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// First float-like run in `text`: digits with at most one decimal point
/// ("4.82 (57)" -> 4.82).
pub fn to_decimal(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let starts_run = bytes[i].is_ascii_digit()
            || (bytes[i] == b'.' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()));
        if !starts_run {
            i += 1;
            continue;
        }
        let start = i;
        let mut seen_dot = false;
        while i < bytes.len() {
            if bytes[i].is_ascii_digit() {
                i += 1;
            } else if bytes[i] == b'.'
                && !seen_dot
                && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())
            {
                seen_dot = true;
                i += 1;
            } else {
                break;
            }
        }
        return text[start..i].parse().ok();
    }
    None
}

/// Digits only; the currency symbol and separators are discarded, so the
/// amount is in whatever unit the page displayed ("$2,400" -> 2400).
pub fn to_currency(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Badge-style flags: strategies address badge text, so presence of any text
/// is the positive signal; an explicit negation reads as false.
pub fn to_flag(text: &str) -> Option<bool> {
    let trimmed = text.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.as_str() {
        "false" | "no" | "0" => Some(false),
        _ => Some(true),
    }
}

/// Floor division; `None` when the night count is zero.
pub fn price_per_night(total: i64, nights: u32) -> Option<i64> {
    if nights == 0 {
        return None;
    }
    Some(total / i64::from(nights))
}

/// Apply the normalizer for `kind` to located raw text.
pub fn normalize(raw: &str, kind: ScalarKind) -> Option<Scalar> {
    match kind {
        ScalarKind::Count => to_count(raw).map(Scalar::Count),
        ScalarKind::Decimal => to_decimal(raw).map(Scalar::Decimal),
        ScalarKind::Currency => to_currency(raw).map(Scalar::Currency),
        ScalarKind::Flag => to_flag(raw).map(Scalar::Flag),
        ScalarKind::Text => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Scalar::Text(trimmed.to_owned()))
            }
        }
    }
}
