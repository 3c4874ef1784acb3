use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value that can be stored in a session.
///
/// Session records must survive backends without an object model, like plain files or a cache
/// server, so only scalars and arrays of scalars are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionValue {
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A finite floating point number.
    Float(f64),
    /// A string.
    String(String),
    /// An array of session values.
    Array(Vec<SessionValue>),
}

impl SessionValue {
    /// Convert any serializable value into a session value.
    ///
    /// Returns `None` for maps, structs, unit values and non-finite floats.
    pub fn from_serializable(value: impl Serialize) -> Option<Self> {
        serde_json::to_value(value).ok().and_then(Self::from_json)
    }

    fn from_json(value: serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        match value {
            Value::Bool(value) => Some(Self::Bool(value)),
            Value::Number(number) => number
                .as_i64()
                .map(Self::Int)
                .or_else(|| number.as_f64().map(Self::Float)),
            Value::String(value) => Some(Self::String(value)),
            Value::Array(values) => values
                .into_iter()
                .map(Self::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Self::Array),
            Value::Null | Value::Object(_) => None,
        }
    }

    /// Convert this value into any deserializable type, if its shape matches.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::to_value(self)
            .ok()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Returns the integer, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the string, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for SessionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SessionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for SessionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for SessionValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// The key/value state of one session.
///
/// Keys are kept in sorted order, which makes the serialized form deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionRecord(BTreeMap<String, SessionValue>);

impl SessionRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, returning the previous value.
    ///
    /// Fails with [`Error::NonScalarValue`] if `value` is not a scalar or an array of scalars.
    /// The record is left unchanged in that case.
    ///
    /// # Example
    ///
    /// ```
    /// # fn main() -> session_lifecycle::Result {
    /// use session_lifecycle::{SessionRecord, SessionValue};
    /// use std::collections::HashMap;
    ///
    /// let mut record = SessionRecord::new();
    /// record.insert("user", "joe")?;
    /// record.insert("roles", vec!["admin", "staff"])?;
    /// assert!(record.insert("nested", HashMap::from([("a", 1)])).is_err());
    /// assert_eq!(record.get("user"), Some(&SessionValue::from("joe")));
    /// # Ok(()) }
    /// ```
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Option<SessionValue>> {
        let key = key.into();
        match SessionValue::from_serializable(value) {
            Some(value) => Ok(self.0.insert(key, value)),
            None => Err(Error::NonScalarValue { key }),
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&SessionValue> {
        self.0.get(key)
    }

    /// Returns true if a value is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Remove and return the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<SessionValue> {
        self.0.remove(key)
    }

    /// Remove all values.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no values are stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<(String, SessionValue)> for SessionRecord {
    fn from_iter<I: IntoIterator<Item = (String, SessionValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
