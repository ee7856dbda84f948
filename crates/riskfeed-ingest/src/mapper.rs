//! Record mapper
//!
//! Pure conversion from one raw API record to one typed row ready for
//! upsert. The raw payload is preserved verbatim in its own column;
//! extraction is one-way (payload -> typed columns) and never reconciled
//! back, so a divergence between the two is an accepted property of the
//! data model, not a defect the mapper tries to repair.
//!
//! Lenient by default: an absent or shape-mismatched field becomes SQL
//! NULL. In strict mode the same condition fails the record. A record
//! whose primary-key columns are all NULL is rejected in both modes —
//! it could never be upserted idempotently.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::endpoint::{ColumnSource, ColumnSpec, ColumnType, EndpointDescriptor};

/// A typed, nullable SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    BigInt(Option<i64>),
    Double(Option<f64>),
    Bool(Option<bool>),
    Timestamp(Option<DateTime<Utc>>),
    Date(Option<NaiveDate>),
    Json(Option<Value>),
}

impl SqlValue {
    pub fn null_of(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Text => SqlValue::Text(None),
            ColumnType::BigInt => SqlValue::BigInt(None),
            ColumnType::Double => SqlValue::Double(None),
            ColumnType::Bool => SqlValue::Bool(None),
            ColumnType::Timestamp => SqlValue::Timestamp(None),
            ColumnType::Date => SqlValue::Date(None),
            ColumnType::Json => SqlValue::Json(None),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Text(v) => v.is_none(),
            SqlValue::BigInt(v) => v.is_none(),
            SqlValue::Double(v) => v.is_none(),
            SqlValue::Bool(v) => v.is_none(),
            SqlValue::Timestamp(v) => v.is_none(),
            SqlValue::Date(v) => v.is_none(),
            SqlValue::Json(v) => v.is_none(),
        }
    }

    /// Display rendering, used for composite keys and operator output.
    pub fn render(&self) -> Option<String> {
        match self {
            SqlValue::Text(v) => v.clone(),
            SqlValue::BigInt(v) => v.map(|n| n.to_string()),
            SqlValue::Double(v) => v.map(|n| n.to_string()),
            SqlValue::Bool(v) => v.map(|b| b.to_string()),
            SqlValue::Timestamp(v) => v.map(|t| t.to_rfc3339()),
            SqlValue::Date(v) => v.map(|d| d.to_string()),
            SqlValue::Json(v) => v.as_ref().map(|j| j.to_string()),
        }
    }
}

/// One mapped row, ready for the storage gateway.
#[derive(Debug, Clone)]
pub struct MappedRow {
    pub columns: Vec<(&'static str, SqlValue)>,
    pub raw_payload: Value,
    pub ingested_at: DateTime<Utc>,
}

impl MappedRow {
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(col, _)| *col == name)
            .map(|(_, v)| v)
    }

    /// Composite key rendering for the given key columns.
    pub fn key_string(&self, key_columns: &[&str]) -> String {
        key_columns
            .iter()
            .map(|k| {
                self.get(k)
                    .and_then(|v| v.render())
                    .unwrap_or_else(|| "\u{0}".to_string())
            })
            .collect::<Vec<_>>()
            .join("\u{1f}")
    }
}

/// Run-scoped inputs the mapper needs beyond the raw record.
#[derive(Debug, Clone)]
pub struct MapContext {
    pub company_guid: Option<String>,
    pub ingested_at: DateTime<Utc>,
    pub strict: bool,
}

/// A single record failed to map.
#[derive(Debug, Clone, thiserror::Error)]
#[error("column '{column}': {reason}")]
pub struct MapError {
    pub column: String,
    pub reason: String,
}

impl MapError {
    fn new(column: &str, reason: impl Into<String>) -> Self {
        Self {
            column: column.to_string(),
            reason: reason.into(),
        }
    }
}

/// Map one raw record into a typed row.
pub fn map_record(
    descriptor: &EndpointDescriptor,
    ctx: &MapContext,
    raw: &Value,
) -> Result<MappedRow, MapError> {
    let mut columns = Vec::with_capacity(descriptor.columns.len());

    for spec in descriptor.columns {
        let value = extract_column(spec, ctx, raw)?;
        columns.push((spec.name, value));
    }

    let row = MappedRow {
        columns,
        raw_payload: raw.clone(),
        ingested_at: ctx.ingested_at,
    };

    if descriptor
        .key_columns
        .iter()
        .all(|k| row.get(k).map(SqlValue::is_null).unwrap_or(true))
    {
        return Err(MapError::new(
            &descriptor.key_columns.join(","),
            "all primary-key columns are null",
        ));
    }

    Ok(row)
}

/// Best-effort identifier for log context when a record is skipped.
pub fn record_identifier(descriptor: &EndpointDescriptor, raw: &Value) -> String {
    for key in descriptor.key_columns {
        if let Some(spec) = descriptor.columns.iter().find(|c| c.name == *key) {
            if let ColumnSource::Field(path) = spec.source {
                if let Some(v) = lookup_path(raw, path) {
                    if let Some(s) = v.as_str() {
                        return s.to_string();
                    }
                }
            }
        }
    }
    raw.get("guid")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string()
}

fn extract_column(
    spec: &ColumnSpec,
    ctx: &MapContext,
    raw: &Value,
) -> Result<SqlValue, MapError> {
    let found = match spec.source {
        ColumnSource::Field(path) => lookup_path(raw, path),
        ColumnSource::AnyField(paths) => paths.iter().find_map(|p| lookup_path(raw, p)),
        ColumnSource::CompanyGuid => {
            return Ok(SqlValue::Text(ctx.company_guid.clone()));
        }
        ColumnSource::SnapshotDate => {
            return Ok(SqlValue::Date(Some(ctx.ingested_at.date_naive())));
        }
    };

    let value = match found {
        Some(v) if !v.is_null() => v,
        _ => {
            if ctx.strict {
                return Err(MapError::new(spec.name, "field is absent"));
            }
            return Ok(SqlValue::null_of(spec.ty));
        }
    };

    match convert(value, spec.ty) {
        Ok(converted) => Ok(converted),
        Err(reason) => {
            if ctx.strict {
                Err(MapError::new(spec.name, reason))
            } else {
                Ok(SqlValue::null_of(spec.ty))
            }
        }
    }
}

/// Walk a dot-separated path through nested objects.
fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Convert a JSON value into the column's SQL type.
///
/// Numeric columns accept numeric strings because CSV endpoints deliver
/// every cell as a string.
fn convert(value: &Value, ty: ColumnType) -> Result<SqlValue, String> {
    match ty {
        ColumnType::Text => match value {
            Value::String(s) => Ok(SqlValue::Text(Some(s.clone()))),
            Value::Number(n) => Ok(SqlValue::Text(Some(n.to_string()))),
            Value::Bool(b) => Ok(SqlValue::Text(Some(b.to_string()))),
            other => Err(format!("expected scalar, got {}", kind_of(other))),
        },
        ColumnType::BigInt => match value {
            Value::Number(n) => n
                .as_i64()
                .map(|i| SqlValue::BigInt(Some(i)))
                .ok_or_else(|| format!("number {} is not a valid bigint", n)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| SqlValue::BigInt(Some(i)))
                .map_err(|_| format!("string '{}' is not a valid bigint", s)),
            other => Err(format!("expected integer, got {}", kind_of(other))),
        },
        ColumnType::Double => match value {
            Value::Number(n) => n
                .as_f64()
                .map(|f| SqlValue::Double(Some(f)))
                .ok_or_else(|| format!("number {} is not a valid double", n)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|f| SqlValue::Double(Some(f)))
                .map_err(|_| format!("string '{}' is not a valid double", s)),
            other => Err(format!("expected number, got {}", kind_of(other))),
        },
        ColumnType::Bool => match value {
            Value::Bool(b) => Ok(SqlValue::Bool(Some(*b))),
            other => Err(format!("expected boolean, got {}", kind_of(other))),
        },
        ColumnType::Timestamp => match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| SqlValue::Timestamp(Some(t.with_timezone(&Utc))))
                .map_err(|_| format!("string '{}' is not a valid timestamp", s)),
            other => Err(format!("expected timestamp string, got {}", kind_of(other))),
        },
        ColumnType::Date => match value {
            Value::String(s) => parse_date(s)
                .map(|d| SqlValue::Date(Some(d)))
                .ok_or_else(|| format!("string '{}' is not a valid date", s)),
            other => Err(format!("expected date string, got {}", kind_of(other))),
        },
        ColumnType::Json => Ok(SqlValue::Json(Some(value.clone()))),
    }
}

/// Accept bare ISO dates and full RFC 3339 timestamps.
fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc).date_naive())
}

fn kind_of(value: &Value) -> &'static str {
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
    use crate::endpoint;
    use chrono::TimeZone;
    use serde_json::json;

    fn ctx(strict: bool) -> MapContext {
        MapContext {
            company_guid: Some("a940bb61-33c4-42c9-9231-c8194c305db3".to_string()),
            ingested_at: Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap(),
            strict,
        }
    }

    #[test]
    fn test_maps_company_with_nested_fields() {
        let descriptor = endpoint::find("companies").unwrap();
        let raw = json!({
            "guid": "a940bb61-33c4-42c9-9231-c8194c305db3",
            "name": "Saperix, Inc.",
            "domain": "saperix.com",
            "industry": { "name": "Technology", "slug": "technology" },
            "sub_industry": { "name": "Software", "slug": "software" },
            "country": "US",
            "added_date": "2021-03-05",
            "rating": 740
        });

        let row = map_record(descriptor, &ctx(false), &raw).unwrap();

        assert_eq!(
            row.get("company_guid"),
            Some(&SqlValue::Text(Some(
                "a940bb61-33c4-42c9-9231-c8194c305db3".to_string()
            )))
        );
        assert_eq!(
            row.get("industry"),
            Some(&SqlValue::Text(Some("Technology".to_string())))
        );
        assert_eq!(
            row.get("added_date"),
            Some(&SqlValue::Date(NaiveDate::from_ymd_opt(2021, 3, 5)))
        );
        assert_eq!(row.get("rating"), Some(&SqlValue::BigInt(Some(740))));
        assert_eq!(row.raw_payload, raw);
    }

    #[test]
    fn test_missing_fields_become_null() {
        let descriptor = endpoint::find("companies").unwrap();
        let raw = json!({ "guid": "a940bb61" });

        let row = map_record(descriptor, &ctx(false), &raw).unwrap();

        assert_eq!(row.get("name"), Some(&SqlValue::Text(None)));
        assert_eq!(row.get("industry"), Some(&SqlValue::Text(None)));
        assert_eq!(row.get("rating"), Some(&SqlValue::BigInt(None)));
    }

    #[test]
    fn test_mismatched_field_becomes_null_when_lenient() {
        let descriptor = endpoint::find("companies").unwrap();
        let raw = json!({ "guid": "a940bb61", "rating": {"value": 740} });

        let row = map_record(descriptor, &ctx(false), &raw).unwrap();
        assert_eq!(row.get("rating"), Some(&SqlValue::BigInt(None)));
    }

    #[test]
    fn test_strict_mode_rejects_missing_field() {
        let descriptor = endpoint::find("companies").unwrap();
        let raw = json!({ "guid": "a940bb61" });

        let err = map_record(descriptor, &ctx(true), &raw).unwrap_err();
        assert_eq!(err.column, "name");
    }

    #[test]
    fn test_strict_mode_rejects_mismatched_field() {
        let descriptor = endpoint::find("users").unwrap();
        let raw = json!({
            "guid": "u-1",
            "friendly_name": "Pat",
            "formal_name": "Pat Doe",
            "email": "pat@example.com",
            "status": "Activated",
            "mfa_status": "enabled",
            "last_login_time": "not-a-timestamp",
            "joined_time": "2024-01-10T09:30:00Z"
        });

        let err = map_record(descriptor, &ctx(true), &raw).unwrap_err();
        assert_eq!(err.column, "last_login_time");
    }

    #[test]
    fn test_numeric_strings_parse_for_csv_rows() {
        let descriptor = endpoint::find("ratings-history").unwrap();
        let raw = json!({ "date": "2026-03-01", "rating": "680" });

        let row = map_record(descriptor, &ctx(false), &raw).unwrap();

        assert_eq!(row.get("rating"), Some(&SqlValue::BigInt(Some(680))));
        assert_eq!(
            row.get("rating_date"),
            Some(&SqlValue::Date(NaiveDate::from_ymd_opt(2026, 3, 1)))
        );
        // Company guid is injected from the run scope, not the payload
        assert_eq!(
            row.get("company_guid"),
            Some(&SqlValue::Text(Some(
                "a940bb61-33c4-42c9-9231-c8194c305db3".to_string()
            )))
        );
    }

    #[test]
    fn test_any_field_fallback() {
        let descriptor = endpoint::find("ratings-history").unwrap();
        let raw = json!({ "rating_date": "2026-03-02", "rating": "655" });

        let row = map_record(descriptor, &ctx(false), &raw).unwrap();
        assert_eq!(
            row.get("rating_date"),
            Some(&SqlValue::Date(NaiveDate::from_ymd_opt(2026, 3, 2)))
        );
    }

    #[test]
    fn test_all_null_primary_key_is_rejected() {
        let descriptor = endpoint::find("companies").unwrap();
        let raw = json!({ "name": "No Guid, Inc." });

        let err = map_record(descriptor, &ctx(false), &raw).unwrap_err();
        assert!(err.reason.contains("primary-key"));
    }

    #[test]
    fn test_snapshot_date_key() {
        let descriptor = endpoint::find("statistics").unwrap();
        let raw = json!({ "companies_rated": 40000 });

        let row = map_record(descriptor, &ctx(false), &raw).unwrap();
        assert_eq!(
            row.get("snapshot_date"),
            Some(&SqlValue::Date(NaiveDate::from_ymd_opt(2026, 3, 14)))
        );
        assert_eq!(row.raw_payload, raw);
    }

    #[test]
    fn test_timestamp_and_date_from_rfc3339() {
        let descriptor = endpoint::find("users").unwrap();
        let raw = json!({
            "guid": "u-1",
            "last_login_time": "2026-02-01T08:15:30+00:00"
        });

        let row = map_record(descriptor, &ctx(false), &raw).unwrap();
        let expected = Utc.with_ymd_and_hms(2026, 2, 1, 8, 15, 30).unwrap();
        assert_eq!(
            row.get("last_login_time"),
            Some(&SqlValue::Timestamp(Some(expected)))
        );
    }

    #[test]
    fn test_record_identifier() {
        let descriptor = endpoint::find("companies").unwrap();
        assert_eq!(
            record_identifier(descriptor, &json!({ "guid": "a940bb61" })),
            "a940bb61"
        );
        assert_eq!(
            record_identifier(descriptor, &json!({ "name": "x" })),
            "<unknown>"
        );
    }

    #[test]
    fn test_key_string_composite() {
        let descriptor = endpoint::find("ratings-history").unwrap();
        let raw = json!({ "date": "2026-03-01", "rating": "680" });
        let row = map_record(descriptor, &ctx(false), &raw).unwrap();

        let key = row.key_string(descriptor.key_columns);
        assert!(key.contains("a940bb61-33c4-42c9-9231-c8194c305db3"));
        assert!(key.contains("2026-03-01"));
    }
}
