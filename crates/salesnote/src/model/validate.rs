//! Field validation patterns.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// A named, compiled validation pattern.
#[derive(Debug)]
pub struct FieldPattern {
    /// Name of the field kind this pattern checks.
    pub name: &'static str,
    regex: Regex,
}

impl FieldPattern {
    /// Compile a new pattern.
    ///
    /// # Panics
    ///
    /// Panics if the regex pattern is invalid.
    #[must_use]
    pub fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("invalid field pattern"),
        }
    }

    /// Check `value` against the pattern.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the field when `value` does not match.
    pub fn check(&self, value: &str) -> Result<()> {
        if self.regex.is_match(value) {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "'{value}' is not a valid {}",
                self.name
            )))
        }
    }
}

/// Loose e-mail address shape: something@domain.tld.
pub static EMAIL: LazyLock<FieldPattern> =
    LazyLock::new(|| FieldPattern::new("email", r"^[^@\s]+@[^@\s]+\.[^@\s]+$"));

/// Digits, spaces, `+`, `-` and parentheses, with at least one digit.
pub static PHONE: LazyLock<FieldPattern> =
    LazyLock::new(|| FieldPattern::new("phone number", r"^[0-9+\-() ]*[0-9][0-9+\-() ]*$"));

/// Validate an optional e-mail field. Blank values are accepted.
///
/// # Errors
///
/// Returns a validation error for malformed addresses.
pub fn optional_email(value: Option<&str>) -> Result<()> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => EMAIL.check(v),
        _ => Ok(()),
    }
}

/// Validate an optional phone field. Blank values are accepted.
///
/// # Errors
///
/// Returns a validation error for phone numbers with other characters.
pub fn optional_phone(value: Option<&str>) -> Result<()> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => PHONE.check(v),
        _ => Ok(()),
    }
}

/// Validate a percentage.
///
/// # Errors
///
/// Returns a validation error above 100.
pub fn probability(value: Option<u8>) -> Result<()> {
    match value {
        Some(p) if p > 100 => Err(Error::validation(format!(
            "probability {p} must be between 0 and 100"
        ))),
        _ => Ok(()),
    }
}

/// Largest amount a money column holds: fifteen digits of whole won.
pub const MAX_AMOUNT: i64 = 999_999_999_999_999;

/// Largest quantity on a single line.
pub const MAX_QUANTITY: u32 = 99_999;

/// Validate a money amount.
///
/// # Errors
///
/// Returns a validation error for negative amounts and amounts above
/// [`MAX_AMOUNT`].
pub fn amount(field: &str, value: Option<i64>) -> Result<()> {
    match value {
        Some(v) if v < 0 => Err(Error::validation(format!(
            "{field} cannot be negative ({v})"
        ))),
        Some(v) if v > MAX_AMOUNT => Err(Error::validation(format!(
            "{field} {v} exceeds the largest amount {MAX_AMOUNT}"
        ))),
        _ => Ok(()),
    }
}

/// Validate a line quantity.
///
/// # Errors
///
/// Returns a validation error above [`MAX_QUANTITY`].
pub fn quantity(value: u32) -> Result<()> {
    if value > MAX_QUANTITY {
        return Err(Error::validation(format!(
            "quantity {value} exceeds {MAX_QUANTITY}"
        )));
    }
    Ok(())
}

/// Narrow an intermediate money result, saturating at the `i64` range.
#[must_use]
pub fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_accepts_common_addresses() {
        assert!(EMAIL.check("kim@lab.ac.kr").is_ok());
        assert!(EMAIL.check("first.last+tag@example.com").is_ok());
    }

    #[test]
    fn test_email_rejects_malformed() {
        assert!(EMAIL.check("no-at-sign").is_err());
        assert!(EMAIL.check("two@@example.com").is_err());
        assert!(EMAIL.check("user@host").is_err());
        assert!(EMAIL.check("sp ace@example.com").is_err());
    }

    #[test]
    fn test_phone_patterns() {
        assert!(PHONE.check("010-1234-5678").is_ok());
        assert!(PHONE.check("+82 (2) 555 0101").is_ok());
        assert!(PHONE.check("02-555-ABCD").is_err());
        assert!(PHONE.check("---").is_err());
    }

    #[test]
    fn test_optional_fields_accept_blank() {
        assert!(optional_email(None).is_ok());
        assert!(optional_email(Some("  ")).is_ok());
        assert!(optional_phone(Some("")).is_ok());
    }

    #[test]
    fn test_error_names_field() {
        let err = optional_email(Some("bad")).unwrap_err().to_string();
        assert!(err.contains("email"));
    }

    #[test]
    fn test_probability_range() {
        assert!(probability(Some(0)).is_ok());
        assert!(probability(Some(100)).is_ok());
        assert!(probability(Some(101)).is_err());
        assert!(probability(None).is_ok());
    }

    #[test]
    fn test_amount_non_negative() {
        assert!(amount("expected revenue", Some(0)).is_ok());
        assert!(amount("expected revenue", Some(-1)).is_err());
    }

    #[test]
    fn test_amount_upper_bound() {
        assert!(amount("unit price", Some(MAX_AMOUNT)).is_ok());
        let err = amount("unit price", Some(MAX_AMOUNT + 1)).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("unit price"));
    }

    #[test]
    fn test_quantity_upper_bound() {
        assert!(quantity(0).is_ok());
        assert!(quantity(MAX_QUANTITY).is_ok());
        assert!(quantity(MAX_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_saturate() {
        assert_eq!(saturate(42), 42);
        assert_eq!(saturate(i128::from(i64::MAX) * 11), i64::MAX);
        assert_eq!(saturate(-i128::from(i64::MAX) * 11), i64::MIN);
    }
}
