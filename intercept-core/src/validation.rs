//! Input checks run before any side effect
//!
//! Pattern lists are checked on enable and update; edits are checked on
//! submit. Both reject synchronously with a [`ValidationError`].

use crate::config::InterceptConfig;
use crate::error::ValidationError;
use intercept_common::{HeaderEntry, SubmitEditPayload};
use serde_json::Value;

/// Substrings that make a URL pattern unsafe, compared case-insensitively
const UNSAFE_PATTERN_MARKERS: &[&str] = &["<script", "javascript:", "data:", "vbscript:", "file:"];

/// Header names whose modification is allowed but reported
pub const SENSITIVE_HEADERS: &[&str] = &["set-cookie", "authorization", "cookie"];

/// Check a URL pattern list against count, length and content rules
pub fn validate_patterns(patterns: &[String], config: &InterceptConfig) -> Result<(), ValidationError> {
    if patterns.len() > config.max_patterns {
        return Err(ValidationError::TooManyPatterns {
            count: patterns.len(),
            max: config.max_patterns,
        });
    }

    for pattern in patterns {
        let length = pattern.chars().count();
        if length > config.max_pattern_length {
            return Err(ValidationError::PatternTooLong {
                length,
                max: config.max_pattern_length,
            });
        }

        let lower = pattern.to_lowercase();
        if UNSAFE_PATTERN_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return Err(ValidationError::UnsafePattern(pattern.clone()));
        }
    }

    Ok(())
}

/// An edit that passed validation.
///
/// `None` fields keep the paused response's original value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidatedEdit {
    pub status: Option<u16>,
    pub headers: Option<Vec<HeaderEntry>>,
    pub body: Option<String>,
    pub warnings: Vec<String>,
}

pub fn validate_edit(
    payload: &SubmitEditPayload,
    config: &InterceptConfig,
) -> Result<ValidatedEdit, ValidationError> {
    let status = payload.status.as_ref().map(parse_status).transpose()?;

    let headers = match &payload.headers {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_headers(value)?),
    };

    if let Some(body) = &payload.body {
        if body.len() > config.max_body_size {
            return Err(ValidationError::BodyTooLarge {
                size: body.len(),
                max: config.max_body_size,
            });
        }
    }

    let warnings = headers
        .as_deref()
        .map(sensitive_header_warnings)
        .unwrap_or_default();

    Ok(ValidatedEdit {
        status,
        headers,
        body: payload.body.clone(),
        warnings,
    })
}

/// Accepts a JSON integer or a string holding one; form fields send strings.
fn parse_status(value: &Value) -> Result<u16, ValidationError> {
    let code = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };

    match code {
        Some(code @ 100..=599) => Ok(code as u16),
        _ => Err(ValidationError::InvalidStatus(value.to_string())),
    }
}

/// Accepts `[{ "name": .., "value": .. }]` or `{ "Name": "value" }`
fn parse_headers(value: &Value) -> Result<Vec<HeaderEntry>, ValidationError> {
    match value {
        Value::Array(entries) => entries
            .iter()
            .map(|entry| {
                let name = entry.get("name").and_then(Value::as_str);
                let value = entry.get("value").and_then(Value::as_str);
                match (name, value) {
                    (Some(name), Some(value)) if !name.trim().is_empty() => {
                        Ok(HeaderEntry::new(name.trim(), value))
                    }
                    _ => Err(ValidationError::InvalidHeaders(format!(
                        "expected a string name and value, got {}",
                        entry
                    ))),
                }
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(name, value)| match value {
                Value::String(value) if !name.trim().is_empty() => {
                    Ok(HeaderEntry::new(name.trim(), value.as_str()))
                }
                other => Err(ValidationError::InvalidHeaders(format!(
                    "header {:?} must have a string value, got {}",
                    name, other
                ))),
            })
            .collect(),
        other => Err(ValidationError::InvalidHeaders(format!(
            "expected a list or object of headers, got {}",
            other
        ))),
    }
}

fn sensitive_header_warnings(headers: &[HeaderEntry]) -> Vec<String> {
    let mut warnings = Vec::new();
    for sensitive in SENSITIVE_HEADERS {
        if headers.iter().any(|header| header.is(sensitive)) {
            warnings.push(format!("Modifying sensitive header: {}", sensitive));
        }
    }
    warnings
}
