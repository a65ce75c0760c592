//! Field-level validation for the intake forms.
//!
//! Forms arrive as raw strings, exactly as typed. Validation never stops at the first
//! problem: every failing field is recorded in a [`FieldErrors`] keyed by field name so the
//! operator sees all of them at once.

use chrono::NaiveTime;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

/// Validation messages keyed by form field name.
///
/// Only the first message recorded for a field is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` against `field` unless the field already has one.
    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Field names with errors, sorted.
    pub fn fields(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// Returns the trimmed value, or records `message` when it is blank.
pub(crate) fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    raw: &str,
    message: &str,
) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        errors.insert(field, message);
        return None;
    }
    Some(trimmed.to_string())
}

/// Trimmed value, or `None` when blank.
pub(crate) fn optional_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub(crate) fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_decimal(s: &str) -> bool {
    match s.split_once('.') {
        Some((whole, frac)) => is_digits(whole) && is_digits(frac),
        None => is_digits(s),
    }
}

/// Parses a required whole number (digits only) within `range`.
pub(crate) fn whole_number(
    errors: &mut FieldErrors,
    field: &str,
    label: &str,
    raw: &str,
    range: RangeInclusive<u16>,
) -> Option<u16> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.insert(field, format!("{label} is required"));
        return None;
    }
    if !is_digits(raw) {
        errors.insert(field, "Enter whole numbers only");
        return None;
    }
    match raw.parse::<u16>() {
        Ok(n) if range.contains(&n) => Some(n),
        _ => {
            errors.insert(field, range_message(label, *range.start(), *range.end()));
            None
        }
    }
}

/// Parses a required non-negative decimal within `range`.
pub(crate) fn decimal(
    errors: &mut FieldErrors,
    field: &str,
    label: &str,
    raw: &str,
    range: RangeInclusive<f64>,
) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.insert(field, format!("{label} is required"));
        return None;
    }
    parse_decimal_in_range(errors, field, label, raw, range)
}

/// Parses an optional non-negative decimal; blank input is `None` without an error.
pub(crate) fn optional_decimal(
    errors: &mut FieldErrors,
    field: &str,
    label: &str,
    raw: &str,
    range: RangeInclusive<f64>,
) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    parse_decimal_in_range(errors, field, label, raw, range)
}

/// Parses an optional whole number; blank input is `None` without an error.
pub(crate) fn optional_whole_number(
    errors: &mut FieldErrors,
    field: &str,
    label: &str,
    raw: &str,
    range: RangeInclusive<u16>,
) -> Option<u16> {
    if raw.trim().is_empty() {
        return None;
    }
    whole_number(errors, field, label, raw, range)
}

fn parse_decimal_in_range(
    errors: &mut FieldErrors,
    field: &str,
    label: &str,
    raw: &str,
    range: RangeInclusive<f64>,
) -> Option<f64> {
    if !is_decimal(raw) {
        errors.insert(field, "Enter a number");
        return None;
    }
    match raw.parse::<f64>() {
        Ok(n) if range.contains(&n) => Some(n),
        _ => {
            errors.insert(field, range_message(label, *range.start(), *range.end()));
            None
        }
    }
}

fn range_message(label: &str, min: impl fmt::Display, max: impl fmt::Display) -> String {
    format!("{label} must be between {min} and {max}")
}

/// Parses an `HH:MM` clock time.
pub(crate) fn clock_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}
