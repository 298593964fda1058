//! Serde model for the subset of FHIR StructureDefinition the registry reads.

use serde::Deserialize;

/// A FHIR StructureDefinition, reduced to what schema derivation needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureDefinition {
    pub resource_type: String,

    pub name: String,

    /// The type this definition constrains (e.g. "Patient", "HumanName").
    #[serde(rename = "type")]
    pub type_name: String,

    /// resource | complex-type | primitive-type | logical
    pub kind: String,

    pub snapshot: Option<ElementList>,

    /// Fallback when a definition ships without a snapshot.
    pub differential: Option<ElementList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementList {
    #[serde(default)]
    pub element: Vec<ElementDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinition {
    pub path: String,

    #[serde(default)]
    pub min: u32,

    /// "0", "1" or "*".
    pub max: Option<String>,

    #[serde(rename = "type", default)]
    pub types: Vec<ElementType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementType {
    pub code: String,
}

impl StructureDefinition {
    /// The element list to derive from, snapshot preferred.
    pub fn elements(&self) -> &[ElementDefinition] {
        self.snapshot
            .as_ref()
            .or(self.differential.as_ref())
            .map(|l| l.element.as_slice())
            .unwrap_or(&[])
    }
}

impl ElementDefinition {
    /// Whether the element repeats (`max` other than "0"/"1").
    pub fn is_collection(&self) -> bool {
        !matches!(self.max.as_deref(), None | Some("0") | Some("1"))
    }

    /// The last path segment, e.g. "gender" for "Patient.gender".
    pub fn leaf_name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    /// Whether the element sits directly under `prefix` (one extra segment).
    pub fn is_direct_child_of(&self, prefix: &str) -> bool {
        self.path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|rest| !rest.contains('.'))
    }
}
