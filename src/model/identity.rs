use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Key identifying a record within its containing collection.
///
/// Equality is typed: `Identity::Int(1)` and `Identity::Text("1")` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Int(i64),
    Text(String),
}

impl Identity {
    /// Read an identity out of a JSON field value. Floats, booleans, null and
    /// composite values are not usable identities.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Identity::Int),
            Value::String(s) if !s.is_empty() => Some(Identity::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Identity::Int(i) => Value::from(*i),
            Identity::Text(s) => Value::String(s.clone()),
        }
    }

    /// Parse an identity from a URL path segment
    pub fn parse_path(segment: &str) -> Self {
        segment
            .parse::<i64>()
            .map(Identity::Int)
            .unwrap_or_else(|_| Identity::Text(segment.to_string()))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Int(i) => write!(f, "{}", i),
            Identity::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Identity::Int(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::Text(value.to_string())
    }
}
