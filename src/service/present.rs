//! Presentation-time formatting of stored values. Nothing here touches queries.

use crate::config::{ComboConfig, EntityModel, FieldType, NumberFormat, STORAGE_DATETIME_PATTERN};
use crate::service::binder::parse_datetime;
use crate::sql::{FieldValue, Row};
use serde::Serialize;

/// Fixed decimals, grouped thousands and a custom decimal separator.
pub fn format_number(value: f64, format: &NumberFormat) -> String {
    let fixed = format!("{:.*}", format.decimals as usize, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(fixed.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push_str(&format.thousands_separator);
        }
        grouped.push(digit);
    }
    if let Some(frac) = frac_part {
        grouped.push_str(&format.decimal_separator);
        grouped.push_str(frac);
    }

    // -0.001 at two decimals prints as 0,00, not -0,00.
    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    if value < 0.0 && !is_zero {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn as_f64(v: &FieldValue) -> Option<f64> {
    match v {
        FieldValue::F64(n) => Some(*n),
        FieldValue::I64(n) => Some(*n as f64),
        FieldValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Stored datetime (timestamp or storage-pattern text) rendered with `pattern`.
pub fn display_datetime(value: &FieldValue, pattern: &str) -> FieldValue {
    let parsed = match value {
        FieldValue::Timestamp(t) => Some(*t),
        FieldValue::String(s) => parse_datetime(s, STORAGE_DATETIME_PATTERN),
        _ => None,
    };
    match parsed {
        Some(t) => FieldValue::String(t.format(pattern).to_string()),
        None => value.clone(),
    }
}

/// Booleans may be stored as integers or text.
pub fn normalize_bool(value: &FieldValue) -> bool {
    match value {
        FieldValue::Bool(b) => *b,
        FieldValue::I64(n) => *n != 0,
        FieldValue::F64(n) => *n != 0.0,
        FieldValue::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "t" | "true" | "on" | "yes" | "y"
        ),
        FieldValue::Null | FieldValue::Timestamp(_) => false,
    }
}

/// A stored key matches a highlight request when both read as the same integer, or else as the same text.
pub fn is_highlighted(key: &FieldValue, highlight: Option<&str>) -> bool {
    let Some(highlight) = highlight.map(str::trim).filter(|h| !h.is_empty()) else {
        return false;
    };
    let key = key.to_string();
    match (key.trim().parse::<i64>(), highlight.parse::<i64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => key == highlight,
    }
}

fn present_value(model: &EntityModel, name: &str, value: &FieldValue) -> FieldValue {
    let Some(descriptor) = model.field(name) else {
        return value.clone();
    };
    match &descriptor.field_type {
        FieldType::Decimal => match (model.number_format(name), as_f64(value)) {
            (Some(nf), Some(n)) => FieldValue::String(format_number(n, nf)),
            _ => value.clone(),
        },
        FieldType::Datetime => display_datetime(
            value,
            descriptor
                .display_format
                .as_deref()
                .unwrap_or(STORAGE_DATETIME_PATTERN),
        ),
        FieldType::Boolean if !value.is_null() => FieldValue::Bool(normalize_bool(value)),
        _ => value.clone(),
    }
}

/// List cell values as displayed.
pub fn list_values(model: &EntityModel, row: &Row) -> Row {
    row.iter()
        .map(|(k, v)| (k.clone(), present_value(model, k, v)))
        .collect()
}

/// Stored row re-rendered as edit-form input values.
pub fn form_values(model: &EntityModel, row: &Row) -> Row {
    row.iter()
        .map(|(k, v)| {
            let value = match model.field(k).map(|d| &d.field_type) {
                Some(FieldType::Boolean) => FieldValue::Bool(normalize_bool(v)),
                _ => present_value(model, k, v),
            };
            (k.clone(), value)
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComboOption {
    pub value: String,
    pub label: String,
}

/// Options for an inline select: key column as value, display columns joined as label.
pub fn combo_options(config: &ComboConfig, rows: &[Row]) -> Vec<ComboOption> {
    rows.iter()
        .map(|row| {
            let value = row
                .get(&config.key_field)
                .map(FieldValue::to_string)
                .unwrap_or_default();
            let label = if config.display_fields.is_empty() {
                value.clone()
            } else {
                config
                    .display_fields
                    .iter()
                    .map(|f| row.get(f).map(FieldValue::to_string).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(&config.separator)
            };
            ComboOption { value, label }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn nf(decimals: u32, dec: &str, thousands: &str) -> NumberFormat {
        NumberFormat {
            decimals,
            decimal_separator: dec.into(),
            thousands_separator: thousands.into(),
        }
    }

    #[test]
    fn formats_numbers() {
        assert_eq!(format_number(1234567.891, &nf(2, ",", ".")), "1.234.567,89");
        assert_eq!(format_number(999.7, &nf(0, ",", " ")), "1 000");
        assert_eq!(format_number(12.0, &nf(3, ".", ",")), "12.000");
        assert_eq!(format_number(0.0, &nf(2, ",", ".")), "0,00");
    }

    #[test]
    fn formats_negative_numbers() {
        assert_eq!(format_number(-1234.5, &nf(2, ",", ".")), "-1.234,50");
        assert_eq!(format_number(-123.0, &nf(0, ",", ".")), "-123");
        assert_eq!(format_number(-0.001, &nf(2, ",", ".")), "0,00");
    }

    #[test]
    fn only_decimals_take_the_number_format() {
        let model = crate::config::parse_entity(
            r#"
entity: { name: stock, table: stock }
fields:
  - { name: id, type: integer }
  - { name: units, type: integer, decimals: 0, decimalSeparator: ",", thousandsSeparator: "." }
  - { name: value, type: decimal, decimals: 2, decimalSeparator: ",", thousandsSeparator: "." }
forms:
  - { name: stocks, type: list }
  - { name: stock, type: detail }
"#,
            &crate::config::DefaultsRegistry::default(),
        )
        .unwrap();
        let row: Row = [
            ("units".to_string(), FieldValue::I64(1234)),
            ("value".to_string(), FieldValue::F64(1234.5)),
        ]
        .into_iter()
        .collect();
        let shown = list_values(&model, &row);
        assert_eq!(shown["units"], FieldValue::I64(1234));
        assert_eq!(shown["value"], FieldValue::String("1.234,50".into()));
        assert_eq!(form_values(&model, &row)["units"], FieldValue::I64(1234));
    }

    #[test]
    fn datetime_rendered_for_display() {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 7).unwrap().and_hms_opt(9, 15, 0).unwrap();
        assert_eq!(
            display_datetime(&FieldValue::Timestamp(ts), "%d/%m/%Y %H:%M"),
            FieldValue::String("07/02/2024 09:15".into())
        );
        assert_eq!(
            display_datetime(&FieldValue::String("2024-02-07 09:15:00".into()), "%d/%m/%Y"),
            FieldValue::String("07/02/2024".into())
        );
        assert_eq!(
            display_datetime(&FieldValue::String("garbage".into()), "%d/%m/%Y"),
            FieldValue::String("garbage".into())
        );
    }

    #[test]
    fn booleans_normalized() {
        assert!(normalize_bool(&FieldValue::I64(1)));
        assert!(normalize_bool(&FieldValue::String("t".into())));
        assert!(!normalize_bool(&FieldValue::String("0".into())));
        assert!(!normalize_bool(&FieldValue::Null));
    }

    #[test]
    fn highlight_compares_numerically() {
        assert!(is_highlighted(&FieldValue::I64(7), Some("7")));
        assert!(is_highlighted(&FieldValue::String("007".into()), Some("7")));
        assert!(!is_highlighted(&FieldValue::I64(7), Some("8")));
        assert!(!is_highlighted(&FieldValue::I64(7), None));
        assert!(is_highlighted(&FieldValue::String("ab".into()), Some("ab")));
    }

    #[test]
    fn combo_labels_join_display_fields() {
        let config = ComboConfig {
            sql: "SELECT id, code, label FROM categories".into(),
            key_field: "id".into(),
            display_fields: vec!["code".into(), "label".into()],
            separator: " - ".into(),
        };
        let rows: Vec<Row> = vec![
            [
                ("id".to_string(), FieldValue::I64(1)),
                ("code".to_string(), FieldValue::String("BK".into())),
                ("label".to_string(), FieldValue::String("Books".into())),
            ]
            .into_iter()
            .collect(),
            [
                ("id".to_string(), FieldValue::I64(2)),
                ("code".to_string(), FieldValue::String("TY".into())),
                ("label".to_string(), FieldValue::String("Toys".into())),
            ]
            .into_iter()
            .collect(),
        ];
        assert_eq!(
            combo_options(&config, &rows),
            vec![
                ComboOption { value: "1".into(), label: "BK - Books".into() },
                ComboOption { value: "2".into(), label: "TY - Toys".into() },
            ]
        );
    }
}
