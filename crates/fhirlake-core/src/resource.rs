use serde_json::Value;

use crate::error::{CoreError, Result};

/// Tag system marking a resource as deleted in an incremental snapshot.
pub const REMOVE_TAG_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ActionType";
/// Tag code marking a resource as deleted in an incremental snapshot.
pub const REMOVE_TAG_CODE: &str = "REMOVE";

/// A FHIR resource kept as its raw JSON document.
///
/// The pipeline never needs the full typed model; it reads the envelope
/// fields (`id`, `resourceType`, `meta`) and passes the document through
/// to the warehouse untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResource(Value);

impl RawResource {
    /// Wrap a JSON document. Fails unless the value is an object.
    pub fn new(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(CoreError::NotAnObject);
        }
        Ok(Self(value))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_inner(self) -> Value {
        self.0
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// The logical id, or an error when absent; the warehouse cannot
    /// key a record without one.
    pub fn require_id(&self) -> Result<&str> {
        self.id().ok_or(CoreError::missing_field("id"))
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.0.get("resourceType").and_then(Value::as_str)
    }

    pub fn require_resource_type(&self) -> Result<&str> {
        self.resource_type()
            .ok_or(CoreError::missing_field("resourceType"))
    }

    pub fn version_id(&self) -> Option<&str> {
        self.0
            .pointer("/meta/versionId")
            .and_then(Value::as_str)
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.0
            .pointer("/meta/lastUpdated")
            .and_then(Value::as_str)
    }

    /// `(system, code)` pairs from `meta.tag`. Entries lacking either
    /// field are skipped.
    pub fn tags(&self) -> Vec<(&str, &str)> {
        self.0
            .pointer("/meta/tag")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| {
                        let system = t.get("system").and_then(Value::as_str)?;
                        let code = t.get("code").and_then(Value::as_str)?;
                        Some((system, code))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether this resource carries the REMOVE action tag.
    pub fn is_tombstone(&self) -> bool {
        self.tags()
            .iter()
            .any(|(system, code)| *system == REMOVE_TAG_SYSTEM && *code == REMOVE_TAG_CODE)
    }
}

impl TryFrom<Value> for RawResource {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient() -> RawResource {
        RawResource::new(json!({
            "resourceType": "Patient",
            "id": "pat-1",
            "meta": {
                "versionId": "3",
                "lastUpdated": "2024-05-15T14:30:00Z",
                "tag": [
                    {"system": "http://example.org/tags", "code": "test"},
                ]
            },
            "gender": "female"
        }))
        .unwrap()
    }

    #[test]
    fn test_envelope_accessors() {
        let r = patient();
        assert_eq!(r.id(), Some("pat-1"));
        assert_eq!(r.resource_type(), Some("Patient"));
        assert_eq!(r.version_id(), Some("3"));
        assert_eq!(r.last_updated(), Some("2024-05-15T14:30:00Z"));
    }

    #[test]
    fn test_require_id_missing() {
        let r = RawResource::new(json!({"resourceType": "Patient"})).unwrap();
        assert!(matches!(
            r.require_id(),
            Err(CoreError::MissingField { field: "id" })
        ));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(RawResource::new(json!([1, 2, 3])).is_err());
        assert!(RawResource::new(json!("Patient")).is_err());
    }

    #[test]
    fn test_tags() {
        let r = patient();
        assert_eq!(r.tags(), vec![("http://example.org/tags", "test")]);
    }

    #[test]
    fn test_tags_absent() {
        let r = RawResource::new(json!({"resourceType": "Patient", "id": "x"})).unwrap();
        assert!(r.tags().is_empty());
        assert!(!r.is_tombstone());
    }

    #[test]
    fn test_tombstone_detection() {
        let r = RawResource::new(json!({
            "resourceType": "Patient",
            "id": "gone",
            "meta": {
                "lastUpdated": "2024-06-01T00:00:00Z",
                "tag": [
                    {"system": REMOVE_TAG_SYSTEM, "code": REMOVE_TAG_CODE}
                ]
            }
        }))
        .unwrap();
        assert!(r.is_tombstone());
    }

    #[test]
    fn test_tombstone_requires_both_fields() {
        let r = RawResource::new(json!({
            "resourceType": "Patient",
            "id": "kept",
            "meta": {
                "tag": [
                    {"system": REMOVE_TAG_SYSTEM, "code": "UPDATE"},
                    {"system": "http://example.org", "code": REMOVE_TAG_CODE}
                ]
            }
        }))
        .unwrap();
        assert!(!r.is_tombstone());
    }

    #[test]
    fn test_tag_entries_without_code_skipped() {
        let r = RawResource::new(json!({
            "resourceType": "Patient",
            "id": "x",
            "meta": {"tag": [{"system": "http://example.org"}]}
        }))
        .unwrap();
        assert!(r.tags().is_empty());
    }
}
