use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One catalog entry exactly as the upstream API returned it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogRecord(Value);

impl CatalogRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up a dotted path such as `name.fr` or `grades.0.level`.
    ///
    /// Numeric segments index into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.0, path)
    }

    /// Upstream `id`, if the record carries an integer one
    pub fn id(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }
}

pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Scalar stored in one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Real(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(i) => Some(*i as f64),
            SqlValue::Real(f) => Some(*f),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Null => None,
        }
    }
}

impl From<&Value> for SqlValue {
    /// Booleans become 0/1; arrays and objects are stored as JSON text
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
            Value::Number(n) => n
                .as_i64()
                .map(SqlValue::Integer)
                .or_else(|| n.as_f64().map(SqlValue::Real))
                .unwrap_or(SqlValue::Null),
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::ToSqlOutput;
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::from(*i),
            SqlValue::Real(f) => ToSqlOutput::from(*f),
            SqlValue::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl rusqlite::types::FromSql for SqlValue {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        use rusqlite::types::ValueRef;
        Ok(match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                SqlValue::Text(String::from_utf8_lossy(t).into_owned())
            }
        })
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Real(r) => write!(f, "{}", r),
            SqlValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Column values for one table
pub type Attributes = BTreeMap<String, SqlValue>;

/// Converted attributes of one record, keyed by target model (table)
pub type ConversionResult = BTreeMap<String, Attributes>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_path() {
        let record = CatalogRecord::new(json!({
            "id": 31,
            "name": {"fr": "Bouftou", "en": "Gobball"},
            "grades": [{"level": 1}, {"level": 5}]
        }));
        assert_eq!(record.get_path("name.en"), Some(&json!("Gobball")));
        assert_eq!(record.get_path("grades.1.level"), Some(&json!(5)));
        assert_eq!(record.get_path("grades.9.level"), None);
        assert_eq!(record.get_path("name.fr.x"), None);
        assert_eq!(record.id(), Some(31));
    }

    #[test]
    fn test_sql_value_from_json() {
        assert_eq!(SqlValue::from(&json!(true)), SqlValue::Integer(1));
        assert_eq!(SqlValue::from(&json!(2.5)), SqlValue::Real(2.5));
        assert_eq!(SqlValue::from(&json!([1, 2])), SqlValue::Text("[1,2]".into()));
        assert_eq!(SqlValue::Real(4.0).as_i64(), Some(4));
        assert_eq!(SqlValue::Text(" 7 ".into()).as_i64(), Some(7));
    }

    #[test]
    fn test_untagged_serialization() {
        let attrs: Attributes = [
            ("level".to_string(), SqlValue::Integer(3)),
            ("image".to_string(), SqlValue::Null),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            serde_json::to_value(&attrs).unwrap(),
            json!({"image": null, "level": 3})
        );
    }
}
