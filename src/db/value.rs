//! Dynamically typed column values and named statement parameters.

use std::collections::BTreeMap;
use std::fmt;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::db::schema::ParamType;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Real(f) => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Convert the value to the representation bound for `kind`.
    ///
    /// Values that cannot be converted are left as they are; SQLite applies
    /// column affinity on its side.
    pub fn coerce(self, kind: ParamType) -> Value {
        match (kind, self) {
            (_, Value::Null) => Value::Null,
            (ParamType::Int, Value::Bool(b)) => Value::Int(i64::from(b)),
            (ParamType::Int, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Text(s),
            },
            (ParamType::Str, Value::Bool(b)) => Value::Text(if b { "1" } else { "0" }.to_string()),
            (ParamType::Str, Value::Int(i)) => Value::Text(i.to_string()),
            (ParamType::Str, Value::Real(f)) => Value::Text(f.to_string()),
            (ParamType::Bool, Value::Int(i)) => Value::Bool(i != 0),
            (ParamType::Bool, Value::Real(f)) => Value::Bool(f != 0.0),
            (ParamType::Bool, Value::Text(s)) => {
                Value::Bool(!matches!(s.as_str(), "" | "0" | "false"))
            }
            (ParamType::Lob, Value::Text(s)) => Value::Blob(s.into_bytes()),
            (_, value) => value,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", if *b { 1 } else { 0 }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Sql::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(Sql::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(Sql::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Int(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        })
    }
}

/// Named statement parameters (`:name` placeholders, stored without the colon).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn extend(&mut self, other: &Params) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row(Vec<(String, Value)>);

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self(columns)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    /// The first column's value (scalar queries).
    pub fn first(&self) -> Option<&Value> {
        self.0.first().map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_columns(self) -> Vec<(String, Value)> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_by_param_type() {
        assert_eq!(Value::from("42").coerce(ParamType::Int), Value::Int(42));
        assert_eq!(Value::from("abc").coerce(ParamType::Int), Value::from("abc"));
        assert_eq!(Value::from(7).coerce(ParamType::Str), Value::from("7"));
        assert_eq!(Value::from(0).coerce(ParamType::Bool), Value::Bool(false));
        assert_eq!(Value::from("yes").coerce(ParamType::Bool), Value::Bool(true));
        assert_eq!(Value::from("ab").coerce(ParamType::Lob), Value::Blob(b"ab".to_vec()));
        assert_eq!(Value::Null.coerce(ParamType::Int), Value::Null);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(3),
            Value::from("x"),
        ])
        .unwrap();
        assert_eq!(json, serde_json::json!([null, true, 3, "x"]));

        let back: Value = serde_json::from_value(serde_json::json!(12)).unwrap();
        assert_eq!(back, Value::Int(12));
    }

    #[test]
    fn test_params_builder() {
        let params = Params::new().with("id", 1).with("name", "bob");
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("id"), Some(&Value::Int(1)));
        assert!(!params.contains("missing"));

        let collected: Params = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(collected.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::from("hi").to_string(), "hi");
    }
}
