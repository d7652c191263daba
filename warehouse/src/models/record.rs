//! Schema-driven coercion of untyped JSON records.
//!
//! Each declared column is looked up in the JSON object and converted to the
//! column's Arrow type. Values that cannot be represented become typed nulls
//! and are reported as [`CoercionIssue`]s; a record is never rejected.

use arrow::datatypes::{DataType, SchemaRef};
use datafusion::scalar::ScalarValue;
use serde_json::Value;
use std::fmt;

/// Field name used when the whole line is not a JSON object.
pub const RECORD_FIELD: &str = "<record>";

/// A value that did not fit its declared column type (a schema coercion
/// warning). The value was replaced by null.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionIssue {
    pub field: String,
    pub expected: DataType,
    pub found: &'static str,
}

impl fmt::Display for CoercionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}' expected {}, found {}",
            self.field, self.expected, self.found
        )
    }
}

#[derive(Debug, Clone)]
pub struct CoercedRecord {
    schema: SchemaRef,
    values: Vec<ScalarValue>,
    issues: Vec<CoercionIssue>,
}

impl CoercedRecord {
    pub fn from_json(schema: SchemaRef, value: &Value) -> Self {
        let mut issues = Vec::new();

        let object = match value {
            Value::Object(map) => Some(map),
            other => {
                issues.push(CoercionIssue {
                    field: RECORD_FIELD.to_string(),
                    expected: DataType::Struct(schema.fields().clone()),
                    found: json_kind(other),
                });
                None
            }
        };

        let values = schema
            .fields()
            .iter()
            .map(|field| {
                let raw = object.and_then(|map| map.get(field.name()));
                match raw {
                    None | Some(Value::Null) => typed_null(field.data_type()),
                    Some(raw) => coerce_value(raw, field.data_type()).unwrap_or_else(|found| {
                        issues.push(CoercionIssue {
                            field: field.name().clone(),
                            expected: field.data_type().clone(),
                            found,
                        });
                        typed_null(field.data_type())
                    }),
                }
            })
            .collect();

        Self {
            schema,
            values,
            issues,
        }
    }

    pub fn issues(&self) -> &[CoercionIssue] {
        &self.issues
    }

    pub fn has_issue(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }

    fn value(&self, name: &str) -> Option<&ScalarValue> {
        let idx = self.schema.index_of(name).ok()?;
        self.values.get(idx)
    }

    pub fn utf8(&self, name: &str) -> Option<String> {
        match self.value(name)? {
            ScalarValue::Utf8(v) => v.clone(),
            _ => None,
        }
    }

    pub fn float64(&self, name: &str) -> Option<f64> {
        match self.value(name)? {
            ScalarValue::Float64(v) => *v,
            _ => None,
        }
    }

    pub fn int32(&self, name: &str) -> Option<i32> {
        match self.value(name)? {
            ScalarValue::Int32(v) => *v,
            _ => None,
        }
    }

    pub fn int64(&self, name: &str) -> Option<i64> {
        match self.value(name)? {
            ScalarValue::Int64(v) => *v,
            _ => None,
        }
    }
}

fn typed_null(data_type: &DataType) -> ScalarValue {
    match data_type {
        DataType::Utf8 => ScalarValue::Utf8(None),
        DataType::Float64 => ScalarValue::Float64(None),
        DataType::Int32 => ScalarValue::Int32(None),
        DataType::Int64 => ScalarValue::Int64(None),
        _ => ScalarValue::Null,
    }
}

/// Converts one JSON value to the declared type, or names what was found.
fn coerce_value(value: &Value, data_type: &DataType) -> Result<ScalarValue, &'static str> {
    match data_type {
        DataType::Utf8 => {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(ScalarValue::Utf8(Some(text)))
        }
        DataType::Float64 => match value {
            Value::Number(n) => n
                .as_f64()
                .map(|f| ScalarValue::Float64(Some(f)))
                .ok_or("unrepresentable number"),
            Value::String(s) => match s.as_str() {
                "NaN" => Ok(ScalarValue::Float64(Some(f64::NAN))),
                "Infinity" | "+Infinity" => Ok(ScalarValue::Float64(Some(f64::INFINITY))),
                "-Infinity" => Ok(ScalarValue::Float64(Some(f64::NEG_INFINITY))),
                _ => Err("string"),
            },
            other => Err(json_kind(other)),
        },
        DataType::Int32 => match value {
            Value::Number(n) => n
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(|i| ScalarValue::Int32(Some(i)))
                .ok_or("non-integer or out-of-range number"),
            other => Err(json_kind(other)),
        },
        // Floats are truncated toward zero; epoch-millisecond fields are
        // sometimes serialized as `1541121934796.0`.
        DataType::Int64 => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(truncate_to_i64))
                .map(|i| ScalarValue::Int64(Some(i)))
                .ok_or("non-finite or out-of-range number"),
            other => Err(json_kind(other)),
        },
        _ => Err("unsupported column type"),
    }
}

fn truncate_to_i64(f: f64) -> Option<i64> {
    let t = f.trunc();
    // i64::MAX is not representable as f64; 2^63 is the first value out of range.
    (t.is_finite() && t >= i64::MIN as f64 && t < 9_223_372_036_854_775_808.0).then_some(t as i64)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SourceSchema, get_source_schema};
    use serde_json::json;

    fn song_record(value: Value) -> CoercedRecord {
        CoercedRecord::from_json(get_source_schema(SourceSchema::SongData), &value)
    }

    #[test]
    fn test_well_formed_record_has_no_issues() {
        let record = song_record(json!({
            "num_songs": 1,
            "artist_id": "ARJIE2Y1187B994AB7",
            "artist_latitude": null,
            "artist_longitude": null,
            "artist_location": "",
            "artist_name": "Line Renaud",
            "song_id": "SOUPIRU12A6D4FA1E1",
            "title": "Der Kleine Dompfaff",
            "duration": 152.92036,
            "year": 0
        }));

        assert!(record.issues().is_empty());
        assert_eq!(record.utf8("artist_id").as_deref(), Some("ARJIE2Y1187B994AB7"));
        assert_eq!(record.utf8("artist_location").as_deref(), Some(""));
        assert_eq!(record.float64("artist_latitude"), None);
        assert_eq!(record.float64("duration"), Some(152.92036));
        assert_eq!(record.int32("year"), Some(0));
        assert_eq!(record.int32("num_songs"), Some(1));
    }

    #[test]
    fn test_malformed_fields_become_null() {
        let record = song_record(json!({
            "song_id": "SOA",
            "duration": "long",
            "year": 2001.5,
            "num_songs": 5_000_000_000_i64,
            "artist_latitude": true
        }));

        assert_eq!(record.utf8("song_id").as_deref(), Some("SOA"));
        assert_eq!(record.float64("duration"), None);
        assert_eq!(record.int32("year"), None);
        assert_eq!(record.int32("num_songs"), None);
        assert_eq!(record.float64("artist_latitude"), None);

        let mut fields: Vec<&str> = record.issues().iter().map(|i| i.field.as_str()).collect();
        fields.sort();
        assert_eq!(fields, vec!["artist_latitude", "duration", "num_songs", "year"]);
        assert!(record.has_issue("duration"));
        assert!(!record.has_issue("song_id"));
    }

    #[test]
    fn test_strings_accept_any_scalar_and_floats_accept_special_values() {
        let record = song_record(json!({
            "artist_id": 42,
            "title": ["a", "b"],
            "artist_longitude": "NaN",
            "artist_latitude": 12
        }));

        assert!(record.issues().is_empty());
        assert_eq!(record.utf8("artist_id").as_deref(), Some("42"));
        assert_eq!(record.utf8("title").as_deref(), Some(r#"["a","b"]"#));
        assert!(record.float64("artist_longitude").unwrap().is_nan());
        assert_eq!(record.float64("artist_latitude"), Some(12.0));
    }

    #[test]
    fn test_int64_accepts_float_values() {
        let schema = get_source_schema(SourceSchema::LogData);
        let record = CoercedRecord::from_json(
            schema.clone(),
            &json!({ "ts": 1541121934796.0, "sessionId": 139.9 }),
        );
        assert!(record.issues().is_empty());
        assert_eq!(record.int64("ts"), Some(1541121934796));
        assert_eq!(record.int64("sessionId"), Some(139));

        let record = CoercedRecord::from_json(schema, &json!({ "ts": 1.0e30 }));
        assert_eq!(record.int64("ts"), None);
        assert!(record.has_issue("ts"));
    }

    #[test]
    fn test_non_object_record_is_all_null() {
        let record = song_record(json!("not a record"));

        assert_eq!(record.issues().len(), 1);
        assert_eq!(record.issues()[0].field, RECORD_FIELD);
        assert_eq!(record.issues()[0].found, "string");
        assert_eq!(record.utf8("song_id"), None);
        assert_eq!(record.int32("year"), None);
    }

    #[test]
    fn test_unknown_column_reads_as_null() {
        let record = song_record(json!({ "song_id": "SOA" }));
        assert_eq!(record.utf8("not_a_column"), None);
    }
}
