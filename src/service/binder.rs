//! Form Binder: coerce submitted text into typed column values.

use crate::config::{EntityModel, FieldType, NumberFormat, DATE_PATTERN, STORAGE_DATETIME_PATTERN};
use crate::sql::{FieldValue, Row};
use chrono::{Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::BTreeMap;

/// Raw form submission keyed by field name.
pub type SubmittedValues = BTreeMap<String, String>;

/// Submitted text that cannot be read as its field's type. The field is left out of the bound row.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BindError {
    #[error("'{0}' is not an integer")]
    Integer(String),
    #[error("'{0}' is not a decimal number")]
    Decimal(String),
    #[error("'{0}' is not a date (expected YYYY-MM-DD)")]
    Date(String),
    #[error("'{value}' does not match datetime pattern {pattern}")]
    Datetime { value: String, pattern: String },
}

pub struct FormBinder;

impl FormBinder {
    pub fn bind(model: &EntityModel, values: &SubmittedValues) -> Row {
        Self::bind_at(model, values, Local::now().naive_local())
    }

    /// Bind with an explicit "now" for empty date and datetime fields.
    pub fn bind_at(model: &EntityModel, values: &SubmittedValues, now: NaiveDateTime) -> Row {
        let mut row = Row::new();
        for field in model.detail.fields() {
            if field.name == model.primary_key || field.read_only {
                continue;
            }
            // Only real columns are written.
            let Some(descriptor) = model.field(&field.name) else {
                continue;
            };
            let raw = values.get(&field.name).map(String::as_str).unwrap_or("");
            let hints = Hints {
                display_format: descriptor.display_format.as_deref(),
                number_format: model.number_format(&field.name),
            };
            match coerce(&field.field_type, &hints, raw, now) {
                Ok(v) => {
                    row.insert(field.name.clone(), v);
                }
                Err(e) => {
                    tracing::debug!(entity = %model.name, field = %field.name, error = %e, "value dropped");
                }
            }
        }
        row
    }
}

/// Display formats the value may have been rendered with.
struct Hints<'a> {
    display_format: Option<&'a str>,
    number_format: Option<&'a NumberFormat>,
}

fn coerce(
    field_type: &FieldType,
    hints: &Hints<'_>,
    raw: &str,
    now: NaiveDateTime,
) -> Result<FieldValue, BindError> {
    if raw.is_empty() {
        return Ok(match field_type {
            FieldType::Boolean => FieldValue::Bool(false),
            FieldType::Date => FieldValue::Timestamp(now),
            FieldType::Datetime => FieldValue::String(now.format(STORAGE_DATETIME_PATTERN).to_string()),
            _ => FieldValue::Null,
        });
    }
    let value = raw.trim();
    match field_type {
        FieldType::String => Ok(FieldValue::String(raw.to_string())),
        FieldType::LookupCombo(_) | FieldType::LookupPopup(_) => Ok(lookup_key(raw)),
        FieldType::Integer => value
            .parse()
            .map(FieldValue::I64)
            .map_err(|_| BindError::Integer(raw.to_string())),
        FieldType::Decimal => normalize_decimal(value, hints.number_format)
            .parse()
            .map(FieldValue::F64)
            .map_err(|_| BindError::Decimal(raw.to_string())),
        FieldType::Boolean => Ok(FieldValue::Bool(matches!(value, "on" | "true" | "1"))),
        FieldType::Date => NaiveDate::parse_from_str(value, DATE_PATTERN)
            .map(|d| FieldValue::Timestamp(d.and_time(chrono::NaiveTime::MIN)))
            .map_err(|_| BindError::Date(raw.to_string())),
        FieldType::Datetime => match hints.display_format {
            Some(pattern) => parse_datetime(value, pattern)
                .map(|dt| FieldValue::String(dt.format(STORAGE_DATETIME_PATTERN).to_string()))
                .ok_or_else(|| BindError::Datetime {
                    value: raw.to_string(),
                    pattern: pattern.to_string(),
                }),
            None => Ok(FieldValue::String(value.to_string())),
        },
    }
}

/// Lookup keys keep their submitted text. Canonical integers go out as integers so they
/// assign to integer and text key columns alike.
fn lookup_key(raw: &str) -> FieldValue {
    match raw.parse::<i64>() {
        Ok(n) if n.to_string() == raw => FieldValue::I64(n),
        _ => FieldValue::String(raw.to_string()),
    }
}

/// Grouped display text (`1.234,50`) loses its thousands separator. Anything else only
/// has a locale comma read as the decimal point.
fn normalize_decimal(value: &str, format: Option<&NumberFormat>) -> String {
    if let Some(nf) = format.filter(|nf| is_grouped(value, nf)) {
        return value
            .replace(&nf.thousands_separator, "")
            .replace(&nf.decimal_separator, ".");
    }
    value.replace(',', ".")
}

fn is_grouped(value: &str, nf: &NumberFormat) -> bool {
    if nf.thousands_separator.is_empty() || nf.thousands_separator == nf.decimal_separator {
        return false;
    }
    let fraction = if nf.decimal_separator.is_empty() {
        String::new()
    } else {
        format!(r"({}\d+)?", regex::escape(&nf.decimal_separator))
    };
    let pattern = format!(
        r"^-?\d{{1,3}}({}\d{{3}})+{}$",
        regex::escape(&nf.thousands_separator),
        fraction
    );
    Regex::new(&pattern).map(|re| re.is_match(value)).unwrap_or(false)
}

/// Full datetime first; a date-only pattern yields midnight.
pub(crate) fn parse_datetime(value: &str, pattern: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, pattern)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, pattern)
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
}
