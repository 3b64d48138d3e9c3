//! Input validation shared by the entity modules.

use devrel_core::error::{DevRelError, Result};
use std::str::FromStr;
use validator::{Validate, ValidationError, ValidationErrors};

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_KEY_LENGTH: usize = 64;

/// Run `validator` rules and fold failures into one `Validation` error.
pub fn check<T: Validate>(input: &T) -> Result<()> {
    input.validate().map_err(|e| DevRelError::Validation(describe(&e)))
}

/// `field: reason; field: reason`, sorted by field name.
pub fn describe(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let reasons: Vec<String> = errs
                .iter()
                .map(|e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => e.code.to_string(),
                })
                .collect();
            format!("{field}: {}", reasons.join(", "))
        })
        .collect();
    parts.sort();
    parts.join("; ")
}

/// Keys for activity actions and plugins: `[a-z0-9_.:-]`, 1-64 chars.
pub fn validate_key(key: &str) -> std::result::Result<(), ValidationError> {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(ValidationError::new("key_length"));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | ':' | '-'))
    {
        return Err(ValidationError::new("key_invalid_chars")
            .with_message("may only contain a-z, 0-9, '_', '.', ':' and '-'".into()));
    }
    Ok(())
}

pub fn validate_not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("must not be blank".into()));
    }
    Ok(())
}

pub fn validate_json_object(value: &serde_json::Value) -> std::result::Result<(), ValidationError> {
    if !value.is_object() {
        return Err(ValidationError::new("not_object").with_message("must be a JSON object".into()));
    }
    Ok(())
}

/// Parse a cron expression. Standard 5-field expressions get a leading
/// seconds field so they can be read by the 6/7-field parser.
pub fn parse_schedule(expr: &str) -> Result<cron::Schedule> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    cron::Schedule::from_str(&normalized)
        .map_err(|e| DevRelError::validation(format!("invalid cron expression '{expr}': {e}")))
}

pub fn validate_cron(expr: &str) -> std::result::Result<(), ValidationError> {
    parse_schedule(expr)
        .map(|_| ())
        .map_err(|_| ValidationError::new("cron").with_message("is not a valid cron expression".into()))
}
