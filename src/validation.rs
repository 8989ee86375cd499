//! Normalization and validation of segment and status codes.

use std::sync::OnceLock;

use regex::Regex;

use crate::{AppError, Result};

static CODE_PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

fn code_pattern() -> Result<&'static Regex> {
    CODE_PATTERN
        .get_or_init(|| Regex::new(r"^[a-z][a-z0-9_.\-]*$"))
        .as_ref()
        .map_err(|err| AppError::Config(format!("invalid code pattern: {err}")))
}

/// Trim and lower-case a segment or status code, rejecting malformed values.
///
/// # Errors
///
/// Returns `AppError::Validation` naming `field` when the code is blank or
/// contains characters outside `[a-z0-9_.-]`.
pub fn normalize_code(raw: &str, field: &str) -> Result<String> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be blank")));
    }
    if !code_pattern()?.is_match(&normalized) {
        return Err(AppError::Validation(format!(
            "{field} '{raw}' is not a valid code"
        )));
    }
    Ok(normalized)
}

/// Normalize every code in `raw`, preserving order and dropping duplicates.
///
/// # Errors
///
/// Returns the first validation failure.
pub fn normalize_codes(raw: &[String], field: &str) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for code in raw {
        let normalized = normalize_code(code, field)?;
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    Ok(out)
}

/// Whether a knowledge reference uses an accepted form.
#[must_use]
pub fn is_valid_knowledge_ref(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed.starts_with("http://")
        || trimmed.starts_with("https://")
        || trimmed.starts_with("/api/")
        || trimmed.starts_with("knowledge/")
        || trimmed.starts_with("shared/docs/knowledge/")
}
