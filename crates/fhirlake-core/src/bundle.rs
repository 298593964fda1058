use serde_json::Value;

use crate::error::Result;
use crate::resource::RawResource;

/// A FHIR search/batch `Bundle` kept as its raw JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle(Value);

impl Bundle {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The server-reported total match count, when present.
    pub fn total(&self) -> Option<u64> {
        self.0.get("total").and_then(Value::as_u64)
    }

    /// Iterate over `entry[].resource` documents.
    pub fn entries(&self) -> impl Iterator<Item = &Value> {
        self.0
            .get("entry")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|e| e.get("resource"))
    }

    pub fn entry_count(&self) -> usize {
        self.entries().count()
    }

    /// Extract every entry resource as a [`RawResource`].
    pub fn resources(&self) -> Result<Vec<RawResource>> {
        self.entries()
            .map(|r| RawResource::new(r.clone()))
            .collect()
    }

    /// The URL of the link with the given relation (`next`, `self`, ...).
    pub fn link(&self, relation: &str) -> Option<&str> {
        self.0
            .get("link")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|l| l.get("relation").and_then(Value::as_str) == Some(relation))
            .and_then(|l| l.get("url"))
            .and_then(Value::as_str)
    }

    pub fn next_link(&self) -> Option<&str> {
        self.link("next")
    }
}

impl From<Value> for Bundle {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
