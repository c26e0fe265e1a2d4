//! Row values: the closed set of scalars that flow between the store, the binder and the payloads.

use crate::config::STORAGE_DATETIME_PATTERN;
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgRow, PgTypeInfo, Postgres};
use sqlx::{Column, Database, Row as _, TypeInfo};
use std::collections::BTreeMap;
use std::fmt;

/// One row keyed by column name.
pub type Row = BTreeMap<String, FieldValue>;

/// A value that can be bound to a PostgreSQL query or returned from one.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Timestamp(NaiveDateTime),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Scalars from YAML documents (field defaults, literal lookup parameters).
    pub fn from_yaml(v: &serde_yaml::Value) -> Self {
        match v {
            serde_yaml::Value::Null => FieldValue::Null,
            serde_yaml::Value::Bool(b) => FieldValue::Bool(*b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::I64(i)
                } else {
                    FieldValue::F64(n.as_f64().unwrap_or_default())
                }
            }
            serde_yaml::Value::String(s) => FieldValue::String(s.clone()),
            other => FieldValue::String(serde_yaml::to_string(other).unwrap_or_default().trim().to_string()),
        }
    }

    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::I64(i),
                None => FieldValue::F64(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => FieldValue::String(s.clone()),
            other => FieldValue::String(other.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::I64(n) => write!(f, "{n}"),
            FieldValue::F64(n) => write!(f, "{n}"),
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Timestamp(t) => write!(f, "{}", t.format(STORAGE_DATETIME_PATTERN)),
        }
    }
}

impl<'q> Encode<'q, Postgres> for FieldValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            FieldValue::Null => Ok(IsNull::Yes),
            FieldValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf),
            FieldValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf),
            FieldValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf),
            FieldValue::String(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf),
            FieldValue::Timestamp(t) => <NaiveDateTime as Encode<Postgres>>::encode_by_ref(t, buf),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            // Unspecified: the server takes the type of the target column.
            FieldValue::Null => PgTypeInfo::with_oid(Oid(0)),
            FieldValue::String(_) => <String as sqlx::Type<Postgres>>::type_info(),
            FieldValue::Bool(_) => <bool as sqlx::Type<Postgres>>::type_info(),
            FieldValue::I64(_) => <i64 as sqlx::Type<Postgres>>::type_info(),
            FieldValue::F64(_) => <f64 as sqlx::Type<Postgres>>::type_info(),
            FieldValue::Timestamp(_) => <NaiveDateTime as sqlx::Type<Postgres>>::type_info(),
        })
    }
}

impl sqlx::Type<Postgres> for FieldValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

/// Decode a result row column by column, dispatching on the column's PostgreSQL type.
pub fn row_from_pg(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|col| {
            let value = cell_from_pg(row, col.ordinal(), col.type_info().name());
            (col.name().to_string(), value)
        })
        .collect()
}

/// Decode rows of arbitrary lookup queries, selected as one `row_to_json` column named `row`.
pub fn row_from_json_column(row: &PgRow) -> Row {
    match row.try_get::<Option<serde_json::Value>, _>("row") {
        Ok(Some(serde_json::Value::Object(map))) => map
            .iter()
            .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
            .collect(),
        Ok(_) => Row::new(),
        Err(e) => {
            tracing::debug!(error = %e, "lookup row not decodable");
            Row::new()
        }
    }
}

fn cell_from_pg(row: &PgRow, idx: usize, type_name: &str) -> FieldValue {
    let decoded = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx).map(|v| v.map(FieldValue::Bool)),
        "INT2" => row.try_get::<Option<i16>, _>(idx).map(|v| v.map(|n| FieldValue::I64(n.into()))),
        "INT4" => row.try_get::<Option<i32>, _>(idx).map(|v| v.map(|n| FieldValue::I64(n.into()))),
        "INT8" => row.try_get::<Option<i64>, _>(idx).map(|v| v.map(FieldValue::I64)),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx).map(|v| v.map(|n| FieldValue::F64(n.into()))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx).map(|v| v.map(FieldValue::F64)),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .map(|v| v.map(FieldValue::Timestamp)),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
            .map(|v| v.map(|d| FieldValue::Timestamp(d.naive_utc()))),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)
            .map(|v| v.map(|j| match j {
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => FieldValue::String(j.to_string()),
                scalar => FieldValue::from_json(&scalar),
            })),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .map(|v| v.map(|d| FieldValue::String(d.format(crate::config::DATE_PATTERN).to_string()))),
        _ => row.try_get::<Option<String>, _>(idx).map(|v| v.map(FieldValue::String)),
    };
    match decoded {
        Ok(Some(v)) => v,
        Ok(None) => FieldValue::Null,
        Err(e) => {
            tracing::debug!(column = idx, pg_type = type_name, error = %e, "column not decodable, returning null");
            FieldValue::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn display_matches_storage_text() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 0)
            .unwrap();
        assert_eq!(FieldValue::Timestamp(ts).to_string(), "2024-03-09 07:05:00");
        assert_eq!(FieldValue::I64(42).to_string(), "42");
        assert_eq!(FieldValue::Null.to_string(), "");
    }

    #[test]
    fn null_is_sent_without_a_type() {
        let untyped = <FieldValue as Encode<Postgres>>::produces(&FieldValue::Null);
        assert_eq!(untyped, Some(PgTypeInfo::with_oid(Oid(0))));
        let text = <FieldValue as Encode<Postgres>>::produces(&FieldValue::String("x".into()));
        assert_eq!(text, Some(<String as sqlx::Type<Postgres>>::type_info()));
    }

    #[test]
    fn yaml_scalars_map_to_closed_variants() {
        let v: serde_yaml::Value = serde_yaml::from_str("12").unwrap();
        assert_eq!(FieldValue::from_yaml(&v), FieldValue::I64(12));
        let v: serde_yaml::Value = serde_yaml::from_str("1.5").unwrap();
        assert_eq!(FieldValue::from_yaml(&v), FieldValue::F64(1.5));
        let v: serde_yaml::Value = serde_yaml::from_str("true").unwrap();
        assert_eq!(FieldValue::from_yaml(&v), FieldValue::Bool(true));
        let v: serde_yaml::Value = serde_yaml::from_str("~").unwrap();
        assert!(FieldValue::from_yaml(&v).is_null());
    }

    #[test]
    fn json_scalars_map_to_closed_variants() {
        let v: serde_json::Value = serde_json::json!({"id": 3, "price": 2.5, "code": "A1", "gone": null});
        let row: Row = v
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
            .collect();
        assert_eq!(row["id"], FieldValue::I64(3));
        assert_eq!(row["price"], FieldValue::F64(2.5));
        assert_eq!(row["code"], FieldValue::String("A1".into()));
        assert!(row["gone"].is_null());
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_string(&vec![
            FieldValue::Null,
            FieldValue::Bool(true),
            FieldValue::String("x".into()),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,true,"x"]"#);
    }
}
