/// Value Conversion Module
///
/// Renders SQLite's dynamic `Value` as `serde_json::Value`, the form rows
/// and entities are exchanged in as plain data mappings.

use rusqlite::types::Value;
use serde_json::Number;

/// A name-keyed data mapping, the shape rows and entities are exchanged in.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Converts a SQLite value into its JSON form.
///
/// Non-finite reals have no JSON form and become `null`.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(t) => serde_json::Value::String(t.clone()),
        Value::Blob(b) => serde_json::Value::from(b.clone()),
    }
}
