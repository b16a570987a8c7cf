use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One record of a tabular provider export. Column order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Textual form of a cell, `None` when absent, null, or blank.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::Null => None,
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Numeric form of a cell. Strings are parsed; anything unparseable or
    /// non-finite (`inf`, `1e400`) is reported as an error so callers can
    /// drop the row instead of storing it.
    pub fn number(&self, key: &str) -> Result<Option<f64>, CellError> {
        let finite = |value: f64, raw: &dyn fmt::Display| {
            if value.is_finite() {
                Ok(Some(value))
            } else {
                Err(CellError::new(key, raw.to_string()))
            }
        };
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => match n.as_f64() {
                Some(value) => finite(value, n),
                None => Err(CellError::new(key, n.to_string())),
            },
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(value) => finite(value, s),
                Err(_) => Err(CellError::new(key, s.clone())),
            },
            Some(other) => Err(CellError::new(key, other.to_string())),
        }
    }

    /// Mirrors the loose truthiness providers rely on: blank, `0`, `false`,
    /// `null` and `NaN` all count as "no value".
    pub fn is_falsy(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => !b,
            Some(Value::Number(n)) => n.as_f64().map_or(true, |v| v == 0.0 || v.is_nan()),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return true;
                }
                match trimmed.parse::<f64>() {
                    Ok(v) => v == 0.0 || v.is_nan(),
                    Err(_) => matches!(
                        trimmed.to_ascii_lowercase().as_str(),
                        "false" | "null" | "nan" | "undefined"
                    ),
                }
            }
            Some(_) => false,
        }
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellError {
    pub column: String,
    pub raw: String,
}

impl CellError {
    fn new(column: &str, raw: impl Into<String>) -> Self {
        Self {
            column: column.to_string(),
            raw: raw.into(),
        }
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column '{}' is not a finite number: '{}'", self.column, self.raw)
    }
}

impl std::error::Error for CellError {}
