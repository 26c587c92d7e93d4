//! Deterministic cleanup of interpreter output before validation.
//!
//! Scanned passports go through OCR upstream, and a handful of character
//! confusions dominate the error budget: `0`/`O` and `1`/`I`/`l`. Each
//! field type has a known alphabet, so the correction direction is fixed
//! per field — letters-only for names, letter-prefix + digit-suffix for
//! passport numbers, digits-only for dates. Every rule is a pure
//! `&str → String` function with no shared state, applied in
//! [`normalize_fields`] before validation.

use crate::record::PassportFields;
use once_cell::sync::Lazy;
use regex::Regex;

/// Standard passport numbers are two letters followed by seven digits.
/// Shorter values are passed through untouched — there is no safe way to
/// decide which end of a truncated value was the letter prefix.
const MIN_PASSPORT_LEN: usize = 9;

/// Apply every normalization rule to the fields that are present.
pub fn normalize_fields(fields: &mut PassportFields) {
    if let Some(s) = fields.surname.take() {
        fields.surname = Some(normalize_name(&s));
    }
    if let Some(s) = fields.given_name.take() {
        fields.given_name = Some(normalize_name(&s));
    }
    if let Some(s) = fields.passport_number.take() {
        fields.passport_number = Some(normalize_passport_number(&s));
    }
    if let Some(s) = fields.gender.take() {
        fields.gender = Some(coerce_gender(&s));
    }
    if let Some(s) = fields.birth_date.take() {
        fields.birth_date = Some(normalize_date(&s));
    }
    if let Some(s) = fields.expiry_date.take() {
        fields.expiry_date = Some(normalize_date(&s));
    }
}

// ── Rule 1: romanised names ──────────────────────────────────────────────────

/// Uppercase a romanised name and undo digit-for-letter confusions
/// (`0` → `O`, `1` → `I`). Names contain no digits, so the letter
/// direction is always correct.
pub fn normalize_name(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '0' => 'O',
            '1' => 'I',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

// ── Rule 2: passport number ──────────────────────────────────────────────────

/// Force the two-letter prefix / digit-suffix shape of a passport number.
///
/// The first two characters are uppercased with `0` → `O` and `1` → `I`;
/// the remainder has `O` → `0` and `I`/`l` → `1`. Values shorter than
/// [`MIN_PASSPORT_LEN`] are returned unmodified.
pub fn normalize_passport_number(input: &str) -> String {
    if input.chars().count() < MIN_PASSPORT_LEN {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    for (i, c) in input.chars().enumerate() {
        let mapped = if i < 2 {
            match c.to_ascii_uppercase() {
                '0' => 'O',
                '1' => 'I',
                up => up,
            }
        } else {
            match c {
                'O' => '0',
                'I' | 'l' => '1',
                c => c,
            }
        };
        out.push(mapped);
    }
    out
}

// ── Rule 3: gender ───────────────────────────────────────────────────────────

/// Uppercase the gender marker and coerce out-of-domain values.
///
/// The coercion (`0`/`O` → `F`, `1`/`I`/`L` → `M`) is a guess at how the
/// single-letter markers misread under OCR; it has not been confirmed
/// against labelled scans and validation still rejects anything that does
/// not land on `M` or `F`.
/// TODO: confirm the mapping against a labelled sample set before relying
/// on it for anything beyond salvaging borderline scans.
pub fn coerce_gender(input: &str) -> String {
    let upper = input.trim().to_ascii_uppercase();
    match upper.as_str() {
        "M" | "F" => upper,
        "0" | "O" => "F".to_string(),
        "1" | "I" | "L" => "M".to_string(),
        _ => upper,
    }
}

// ── Rule 4: dates ────────────────────────────────────────────────────────────

static RE_NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9]").unwrap());

/// Strip separators from a date, keeping the result only when exactly
/// eight digits remain (`YYYYMMDD`).
///
/// Anything else is returned as received so validation rejects the
/// original value instead of a silently mangled one.
pub fn normalize_date(input: &str) -> String {
    let digits = RE_NON_DIGIT.replace_all(input, "");
    if digits.len() == 8 {
        digits.into_owned()
    } else {
        input.to_string()
    }
}
