//! Secret key/value payloads
//!
//! A secret is a flat JSON object of string (or null) values. Inheritance
//! depends on telling three states apart for every key: absent (not in the
//! map), present but empty (`null` or `""`), and present with a value.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A single stored value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum SecretValue {
    /// Stored as JSON `null`
    Null,
    /// Stored as a JSON string, possibly empty
    Text(String),
}

impl SecretValue {
    /// Build a text value
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// `true` for `null` and for the empty string
    pub fn is_empty(&self) -> bool {
        match self {
            SecretValue::Null => true,
            SecretValue::Text(s) => s.is_empty(),
        }
    }

    /// The string value, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SecretValue::Null => None,
            SecretValue::Text(s) => Some(s),
        }
    }
}

impl From<Option<String>> for SecretValue {
    fn from(value: Option<String>) -> Self {
        value.map(SecretValue::Text).unwrap_or(SecretValue::Null)
    }
}

impl From<SecretValue> for Option<String> {
    fn from(value: SecretValue) -> Self {
        match value {
            SecretValue::Null => None,
            SecretValue::Text(s) => Some(s),
        }
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        SecretValue::Text(value.to_string())
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        SecretValue::Text(value)
    }
}

// Values are secrets: Debug never prints them.
impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretValue::Null => write!(f, "Null"),
            SecretValue::Text(s) if s.is_empty() => write!(f, "Text(\"\")"),
            SecretValue::Text(_) => write!(f, "Text([REDACTED])"),
        }
    }
}

/// Ordered key/value map of one secret version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretKeyValues(BTreeMap<String, SecretValue>);

impl SecretKeyValues {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Parse a backend or caller payload.
    ///
    /// The payload must be a flat JSON object. Strings and `null` are kept as
    /// is, numbers and booleans are stored as their JSON text, nested objects
    /// and arrays are rejected.
    pub fn from_json_value(value: Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(Error::validation_field(
                "Secret payload must be a JSON object of key/value pairs",
                "secret",
            ));
        };

        let mut map = BTreeMap::new();
        for (key, value) in object {
            if key.is_empty() {
                return Err(Error::validation_field("Secret key names cannot be empty", "secret"));
            }
            let value = match value {
                Value::Null => SecretValue::Null,
                Value::String(s) => SecretValue::Text(s),
                Value::Bool(b) => SecretValue::Text(b.to_string()),
                Value::Number(n) => SecretValue::Text(n.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(Error::validation_field(
                        format!("Secret key '{}' must hold a string, number, boolean or null", key),
                        key,
                    ));
                }
            };
            map.insert(key, value);
        }

        Ok(Self(map))
    }

    /// Parse a JSON document; malformed JSON is a validation error.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|e| {
            Error::validation_field(format!("Secret payload is not valid JSON: {}", e), "secret")
        })?;
        Self::from_json_value(value)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization {
            source: e,
            context: "Failed to serialize secret payload".to_string(),
        })
    }

    pub fn get(&self, key: &str) -> Option<&SecretValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SecretValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<SecretValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SecretValue)> {
        self.0.iter()
    }

    /// Key names, sorted
    pub fn key_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Overlay `delta` onto this map; keys in `delta` replace existing ones.
    pub fn apply(&mut self, delta: &SecretKeyValues) {
        for (key, value) in delta.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for SecretKeyValues
where
    K: Into<String>,
    V: Into<SecretValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for SecretKeyValues {
    type Item = (String, SecretValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, SecretValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
