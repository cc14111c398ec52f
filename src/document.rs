//! Schema-less API documents.
//!
//! The remote API returns loosely shaped JSON objects. [`Document`] wraps one
//! object and exposes checked accessors for the handful of fields the exporter
//! relies on, so a missing or mistyped key surfaces as a [`DocumentError`]
//! instead of a panic.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Format used by messages and comments for `updated_at`, e.g. `2023-06-15 2:30 PM`.
pub const FORMATTED_DATE: &str = "%Y-%m-%d %I:%M %p";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("missing field `{0}`")]
    Missing(String),

    #[error("field `{key}` is not {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("field `{key}` holds an out-of-range timestamp: {value}")]
    InvalidTimestamp { key: String, value: String },

    #[error("field `{key}` holds an unparseable date `{value}`: {source}")]
    InvalidDate {
        key: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// One JSON object as delivered by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(DocumentError::NotAnObject),
        }
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Remove a key, keeping the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    fn require(&self, key: &str) -> Result<&Value, DocumentError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Err(DocumentError::Missing(key.to_string())),
            Some(value) => Ok(value),
        }
    }

    /// The entity id. The API uses integers, but string ids are accepted too.
    pub fn id(&self) -> Result<String, DocumentError> {
        match self.require("id")? {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => Ok(s.clone()),
            _ => Err(DocumentError::WrongType {
                key: "id".to_string(),
                expected: "a number or string",
            }),
        }
    }

    pub fn name(&self) -> Result<&str, DocumentError> {
        self.str_field("name")
    }

    pub fn str_field(&self, key: &str) -> Result<&str, DocumentError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| DocumentError::WrongType {
                key: key.to_string(),
                expected: "a string",
            })
    }

    /// Like [`str_field`](Self::str_field) but treats a missing, null or blank
    /// value as absent.
    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn u64_field(&self, key: &str) -> Result<u64, DocumentError> {
        self.require(key)?
            .as_u64()
            .ok_or_else(|| DocumentError::WrongType {
                key: key.to_string(),
                expected: "a non-negative integer",
            })
    }

    /// Read an epoch-milliseconds field (integer or float) as a UTC instant.
    pub fn epoch_millis(&self, key: &str) -> Result<DateTime<Utc>, DocumentError> {
        let value = self.require(key)?;
        let millis = value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .ok_or_else(|| DocumentError::WrongType {
                key: key.to_string(),
                expected: "epoch milliseconds",
            })?;
        DateTime::from_timestamp_millis(millis).ok_or_else(|| DocumentError::InvalidTimestamp {
            key: key.to_string(),
            value: millis.to_string(),
        })
    }

    /// Read a [`FORMATTED_DATE`] string field, interpreted as UTC.
    pub fn formatted_date(&self, key: &str) -> Result<DateTime<Utc>, DocumentError> {
        let raw = self.str_field(key)?;
        parse_formatted_date(raw).map_err(|source| DocumentError::InvalidDate {
            key: key.to_string(),
            value: raw.to_string(),
            source,
        })
    }

    pub fn list(&self, key: &str) -> Result<&Vec<Value>, DocumentError> {
        self.require(key)?
            .as_array()
            .ok_or_else(|| DocumentError::WrongType {
                key: key.to_string(),
                expected: "a list",
            })
    }

    pub fn list_mut(&mut self, key: &str) -> Result<&mut Vec<Value>, DocumentError> {
        match self.0.get_mut(key) {
            None | Some(Value::Null) => Err(DocumentError::Missing(key.to_string())),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(DocumentError::WrongType {
                key: key.to_string(),
                expected: "a list",
            }),
        }
    }

    /// Move the objects of a list field out of the document.
    ///
    /// Non-object entries are dropped; listings only ever hold objects.
    pub fn take_documents(&mut self, key: &str) -> Result<Vec<Document>, DocumentError> {
        let items = std::mem::take(self.list_mut(key)?);
        Ok(items
            .into_iter()
            .filter_map(|item| Document::from_value(item).ok())
            .collect())
    }

    /// Total page count declared by a paginated response. Defaults to 1.
    pub fn page_count(&self) -> u64 {
        self.0.get("pages").and_then(Value::as_u64).unwrap_or(1)
    }

    /// Shallow merge with list-append. See [`merge_into`].
    pub fn merge(&mut self, incoming: Document) {
        merge_into(&mut self.0, incoming.0);
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Parse a [`FORMATTED_DATE`] string as UTC.
pub fn parse_formatted_date(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), FORMATTED_DATE).map(|naive| naive.and_utc())
}

/// Fold `incoming` into `target`.
///
/// When both sides hold a list under the same key the incoming items are
/// appended after the existing ones. Every other key is overwritten by the
/// incoming value. Keys only present in `target` are left alone.
pub fn merge_into(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match value {
            Value::Array(mut items) => match target.get_mut(&key) {
                Some(Value::Array(existing)) => existing.append(&mut items),
                _ => {
                    target.insert(key, Value::Array(items));
                }
            },
            value => {
                target.insert(key, value);
            }
        }
    }
}
