//! Driver options supplied alongside a connection string.
#![deny(missing_docs)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Driver option enabling the liveness check before each guarded operation.
pub const CHECK_CONNECTION_BEFOREHAND: &str = "check_connection_beforehand";

/// String-keyed option mapping consumed by a backend driver when a
/// connection is opened.
///
/// Options understood by [`GuardedConnection`][crate::GuardedConnection]
/// are removed from the mapping before it reaches the driver.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DriverOptions(BTreeMap<String, Value>);

impl DriverOptions {
    /// Create an empty option mapping.
    pub fn new() -> Self {
        Self::default()
    }
    /// Set an option, returning the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }
    /// Get the raw value of an option.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
    /// Remove an option, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }
    /// Whether the option is present, regardless of its value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
    /// Number of options set.
    pub fn len(&self) -> usize {
        self.0.len()
    }
    /// Whether no options are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Iterate over options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
    /// Interpret an option as a boolean flag. See [`flag_value`].
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).map(flag_value)
    }
    /// Like [`get_bool`][Self::get_bool] but also removes the option.
    pub fn take_bool(&mut self, key: &str) -> Option<bool> {
        self.0.remove(key).as_ref().map(flag_value)
    }
    /// Interpret an option as a non-negative integer. Numeric strings are accepted.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        let Some(value) = self.0.get(key) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| Error::InvalidOption {
            key: key.to_string(),
            detail: format!("expected a non-negative integer, found {value}"),
        })
    }
}

impl<K, V> FromIterator<(K, V)> for DriverOptions
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        DriverOptions(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Permissive boolean interpretation of an option value.
///
/// `true`, the number 1 and the strings `1`, `true`, `on` and `yes`
/// (case-insensitive, surrounding whitespace ignored) are true.
/// Anything else, including `null`, is false.
pub fn flag_value(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "on" | "yes"
        ),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}
