// lib/src/ledger/validation.rs

use chrono::{DateTime, Utc};
use models::errors::{ValidationError, ValidationResult};
use models::identifiers::UserId;

/// Trims free text; blank input counts as absent.
pub fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Optional free text that, when given, must reach `min_len` characters.
pub fn optional_text(field: &'static str, value: Option<String>, min_len: usize) -> ValidationResult<Option<String>> {
    match normalize_text(value) {
        Some(text) if text.chars().count() < min_len => Err(ValidationError::TooShort { field, min: min_len }),
        other => Ok(other),
    }
}

pub fn required_text(field: &'static str, value: Option<String>, min_len: usize) -> ValidationResult<String> {
    optional_text(field, value, min_len)?.ok_or(ValidationError::MissingField(field))
}

pub fn future_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ValidationResult<()> {
    match expires_at {
        Some(expires) if expires <= now => Err(ValidationError::ExpiryInPast),
        _ => Ok(()),
    }
}

pub fn distinct_parties(a: &UserId, b: &UserId) -> ValidationResult<()> {
    if a == b {
        return Err(ValidationError::SelfReference);
    }
    Ok(())
}
