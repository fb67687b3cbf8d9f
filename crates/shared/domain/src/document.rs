//! Typed key-value documents.
//!
//! Backs the open-ended JSON columns (`preferences`, `metadata`,
//! `device_info`, `location_info`). Values are restricted to strings, numbers,
//! booleans and nested documents; JSON nulls and arrays are rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A single document value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocValue {
    Bool(bool),
    Number(f64),
    String(String),
    Map(Document),
}

impl From<bool> for DocValue {
    fn from(value: bool) -> Self {
        DocValue::Bool(value)
    }
}

impl From<f64> for DocValue {
    fn from(value: f64) -> Self {
        DocValue::Number(value)
    }
}

impl From<i64> for DocValue {
    fn from(value: i64) -> Self {
        DocValue::Number(value as f64)
    }
}

impl From<&str> for DocValue {
    fn from(value: &str) -> Self {
        DocValue::String(value.to_string())
    }
}

impl From<String> for DocValue {
    fn from(value: String) -> Self {
        DocValue::String(value)
    }
}

impl From<Document> for DocValue {
    fn from(value: Document) -> Self {
        DocValue::Map(value)
    }
}

/// String-keyed map of [`DocValue`]s, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(BTreeMap<String, DocValue>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&DocValue> {
        self.0.get(key)
    }

    /// Insert a value, returning the previous one for that key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<DocValue>) -> Option<DocValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<DocValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocValue)> {
        self.0.iter()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<DocValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// First key, depth first, holding a NaN or infinite number.
    fn non_finite_key(&self) -> Option<&str> {
        self.0.iter().find_map(|(key, value)| match value {
            DocValue::Number(n) if !n.is_finite() => Some(key.as_str()),
            DocValue::Map(inner) => inner.non_finite_key(),
            _ => None,
        })
    }
}

impl<K: Into<String>, V: Into<DocValue>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Decode a stored JSON column.
///
/// Anything outside the value set is corrupt data, not caller input.
impl TryFrom<serde_json::Value> for Document {
    type Error = DomainError;

    fn try_from(value: serde_json::Value) -> DomainResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| DomainError::invalid_value("document", e.to_string()))
    }
}

/// Encode for a JSON column. NaN and infinities have no JSON form.
impl TryFrom<Document> for serde_json::Value {
    type Error = DomainError;

    fn try_from(document: Document) -> DomainResult<Self> {
        if let Some(key) = document.non_finite_key() {
            return Err(DomainError::validation(format!(
                "Document value '{}' must be a finite number",
                key
            )));
        }
        serde_json::to_value(document)
            .map_err(|e| DomainError::internal(format!("Document encode failed: {}", e)))
    }
}
