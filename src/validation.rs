//! Input validation shared by entity payloads and the booking scheduler.
//!
//! Each validator returns `Err(message)`; callers attach the field name and
//! turn it into a `CoreError::Validation` or feed it to the API layer's
//! `ValidationErrorBuilder`.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::CoreError;

lazy_static! {
    /// Pragmatic email shape: something@something.tld, no whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();

    /// Lowercase slug: words of [a-z0-9] joined by single dashes
    static ref SLUG_REGEX: Regex = Regex::new(
        r"^[a-z0-9]+(-[a-z0-9]+)*$"
    ).unwrap();

    /// HTTP/HTTPS URL
    static ref URL_REGEX: Regex = Regex::new(
        r"^https?://[a-zA-Z0-9][-a-zA-Z0-9]*(\.[a-zA-Z0-9][-a-zA-Z0-9]*)*(:\d+)?(/[^\s]*)?$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

/// Validate and parse a `YYYY-MM-DD` date
pub fn parse_iso_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}', expected YYYY-MM-DD", value))
}

/// Validate a URL-safe slug
pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.is_empty() {
        return Err("Slug is required".to_string());
    }

    if slug.len() > 200 {
        return Err("Slug is too long (max 200 characters)".to_string());
    }

    if !SLUG_REGEX.is_match(slug) {
        return Err(
            "Slug must be lowercase alphanumeric words separated by single dashes".to_string(),
        );
    }

    Ok(())
}

/// Validate an optional HTTP(S) URL; empty strings are treated as absent
pub fn validate_url(url: &Option<String>) -> Result<(), String> {
    if let Some(u) = url {
        if u.is_empty() {
            return Ok(());
        }

        if u.len() > 2048 {
            return Err("URL is too long (max 2048 characters)".to_string());
        }

        if !URL_REGEX.is_match(u) {
            return Err("Invalid URL. Must start with http:// or https://".to_string());
        }
    }

    Ok(())
}

/// Validate a 1-5 star rating
pub fn validate_rating(rating: i64) -> Result<(), String> {
    if !(1..=5).contains(&rating) {
        return Err("Rating must be between 1 and 5".to_string());
    }
    Ok(())
}

/// Reject an empty or whitespace-only required string
pub fn require(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::validation(field, format!("{} is required", field)));
    }
    Ok(())
}

/// Lift a validator's message into a field-tagged `CoreError`
pub fn check(field: &str, result: Result<(), String>) -> Result<(), CoreError> {
    result.map_err(|message| CoreError::validation(field, message))
}
