//! SQLite value and row conversion functions.
//!
//! Pure functions for converting between SQLite values/rows and the core
//! `Value` type. These are testable in isolation without database access.

use std::collections::BTreeMap;

use dbwire_core::entity::Value;
use dbwire_core::schema::Table;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Row;
use serde::Serialize;

/// One row of an entity table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub entity: String,
    /// Primary key value, `Null` for composite keys.
    pub key: Value,
    pub values: BTreeMap<String, Value>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }
}

/// Convert a core value to an owned SQLite value.
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Blob(v) => SqlValue::Blob(v.clone()),
    }
}

/// Convert a list of core values to bindable parameters.
pub fn to_params<'a>(values: impl IntoIterator<Item = &'a Value>) -> Vec<SqlValue> {
    values.into_iter().map(to_sql).collect()
}

/// Convert a borrowed SQLite value to a core value.
pub fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

/// Convert a SQLite row to a Record.
///
/// Expected columns: every column of `table`, in declaration order.
pub fn row_to_record(row: &Row, entity: &str, table: &Table) -> rusqlite::Result<Record> {
    let mut values = BTreeMap::new();
    for (index, column) in table.columns.iter().enumerate() {
        values.insert(column.name.clone(), from_sql(row.get_ref(index)?));
    }

    let key = match table.primary_key().as_slice() {
        [key] => values.get(&key.name).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    };

    Ok(Record {
        entity: entity.to_string(),
        key,
        values,
    })
}
