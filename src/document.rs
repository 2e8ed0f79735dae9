//! Parsed JSON documents and path queries

use serde_json::Value;
use thiserror::Error;

/// Errors raised while resolving a path inside a document
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("invalid type at {path}: expected number, found {found}")]
    NotNumeric { path: String, found: &'static str },
}

/// One JSON object representing one sampling instant
#[derive(Debug, Clone)]
pub struct Document {
    root: Value,
}

impl Document {
    /// Parse a document, requiring a JSON object at the top level
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let root: Value = serde_json::from_str(text)?;
        Self::from_value(root)
    }

    pub fn from_value(root: Value) -> Result<Self, serde_json::Error> {
        if !root.is_object() {
            return Err(serde::de::Error::custom(format!(
                "expected a JSON object, found {}",
                kind(&root)
            )));
        }
        Ok(Self { root })
    }

    /// Resolve a dot separated path
    ///
    /// Integer segments index into arrays, either bare (`items.0`) or bracketed (`items.[0]`).
    pub fn query(&self, path: &str) -> Result<&Value, QueryError> {
        let mut node = &self.root;
        for segment in path.split('.') {
            let next = match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => array_index(segment).and_then(|i| items.get(i)),
                _ => None,
            };
            node = next.ok_or_else(|| QueryError::NotFound(path.to_string()))?;
        }
        Ok(node)
    }

    /// Resolve a path that must hold a number
    pub fn number(&self, path: &str) -> Result<f64, QueryError> {
        let value = self.query(path)?;
        value.as_f64().ok_or_else(|| QueryError::NotNumeric {
            path: path.to_string(),
            found: kind(value),
        })
    }
}

fn array_index(segment: &str) -> Option<usize> {
    let inner = segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(segment);
    inner.parse().ok()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
