//! Request validation from the detail form's sidecar rules.

use crate::config::{FieldRule, ValidationSpec};
use crate::service::SubmittedValues;
use std::collections::BTreeMap;

/// Field name to message. Empty means the submission is valid.
pub type FieldErrors = BTreeMap<String, String>;

pub struct RequestValidator;

impl RequestValidator {
    /// Apply every declared rule. No spec means nothing to check.
    pub fn validate(spec: Option<&ValidationSpec>, values: &SubmittedValues) -> FieldErrors {
        let mut errors = FieldErrors::new();
        let Some(spec) = spec else {
            return errors;
        };
        for (field, rule) in &spec.rules {
            let value = values.get(field).map(String::as_str).unwrap_or("");
            if let Some(message) = check_field(field, value, rule) {
                errors.insert(field.clone(), message);
            }
        }
        errors
    }
}

/// Required failure stops the other checks. Max is checked after min and replaces its message.
fn check_field(field: &str, value: &str, rule: &FieldRule) -> Option<String> {
    if value.is_empty() {
        return rule
            .required
            .then(|| message_or(&rule.required_message, || format!("{field} is required")));
    }
    let len = value.chars().count();
    let mut error = None;
    if let Some(min) = rule.min_length.filter(|min| len < *min) {
        error = Some(message_or(&rule.min_message, || {
            format!("{field} must be at least {min} characters")
        }));
    }
    if let Some(max) = rule.max_length.filter(|max| len > *max) {
        error = Some(message_or(&rule.max_message, || {
            format!("{field} must be at most {max} characters")
        }));
    }
    error
}

fn message_or(configured: &str, fallback: impl FnOnce() -> String) -> String {
    if configured.is_empty() {
        fallback()
    } else {
        configured.to_string()
    }
}
