//! Per-resource-type Arrow schema resolution.
//!
//! Schemas are derived once from structure-definition JSON on disk and
//! cached. Derivation is a pure function of the definition files and the
//! recursion bound, so two processes pointed at the same directory resolve
//! byte-identical schemas; the merger relies on this for file interchange.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use arrow::datatypes::{DataType, Field, Fields, Schema, SchemaRef};
use tracing::{debug, info};

use fhirlake_core::FhirVersion;

use crate::envelope::envelope_fields;
use crate::error::{Result, SchemaError};
use crate::structure_definition::{ElementDefinition, StructureDefinition};

/// Top-level elements the envelope already covers, plus content that is
/// never projected to typed columns (it stays in `resource_json`).
const UNPROJECTED_ELEMENTS: &[&str] = &["id", "meta", "extension", "modifierExtension", "contained", "text"];

#[derive(Debug)]
pub struct SchemaRegistry {
    version: FhirVersion,
    recursive_depth: u32,
    defs: HashMap<String, StructureDefinition>,
    cache: RwLock<HashMap<String, SchemaRef>>,
}

impl SchemaRegistry {
    /// Load structure definitions (when a directory is given) and prepare
    /// an empty cache. Files that are not StructureDefinitions are
    /// ignored; files that fail to parse are a [`SchemaError::ProfileLoad`].
    pub fn new(
        version: FhirVersion,
        structure_definitions_dir: Option<&Path>,
        recursive_depth: u32,
    ) -> Result<Self> {
        let mut defs = HashMap::new();

        if let Some(dir) = structure_definitions_dir {
            let mut paths: Vec<_> = fs::read_dir(dir)?
                .collect::<std::io::Result<Vec<_>>>()?
                .into_iter()
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            // Load order must not depend on directory iteration order.
            paths.sort();

            for path in paths {
                let content = fs::read_to_string(&path)
                    .map_err(|e| SchemaError::profile_load(&path, e.to_string()))?;
                let doc: serde_json::Value = serde_json::from_str(&content)
                    .map_err(|e| SchemaError::profile_load(&path, e.to_string()))?;
                if doc.get("resourceType").and_then(|v| v.as_str()) != Some("StructureDefinition") {
                    continue;
                }
                let def: StructureDefinition = serde_json::from_value(doc)
                    .map_err(|e| SchemaError::profile_load(&path, e.to_string()))?;
                debug!(type_name = %def.type_name, kind = %def.kind, "loaded structure definition");
                defs.insert(def.type_name.clone(), def);
            }
            info!(
                count = defs.len(),
                fhir_version = %version,
                "structure definitions loaded"
            );
        }

        Ok(Self {
            version,
            recursive_depth,
            defs,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn fhir_version(&self) -> FhirVersion {
        self.version
    }

    /// Resolve the Arrow schema for a resource type. Idempotent and
    /// thread-safe; the first resolution per type is cached.
    pub fn schema_for(&self, resource_type: &str) -> Result<SchemaRef> {
        if let Some(schema) = self.cache.read().expect("schema cache poisoned").get(resource_type) {
            return Ok(schema.clone());
        }

        let schema = self.derive(resource_type)?;
        self.cache
            .write()
            .expect("schema cache poisoned")
            .insert(resource_type.to_string(), schema.clone());
        Ok(schema)
    }

    fn derive(&self, resource_type: &str) -> Result<SchemaRef> {
        let mut fields = envelope_fields();

        if self.defs.is_empty() {
            // No profiles configured: every type gets the bare envelope.
            return Ok(Arc::new(Schema::new(fields)));
        }

        let def = self
            .defs
            .get(resource_type)
            .filter(|d| d.kind == "resource")
            .ok_or_else(|| SchemaError::UnknownResourceType(resource_type.to_string()))?;

        let elements = def.elements();
        for elem in elements {
            if !elem.is_direct_child_of(resource_type) {
                continue;
            }
            let name = elem.leaf_name();
            if UNPROJECTED_ELEMENTS.contains(&name.trim_end_matches("[x]")) {
                continue;
            }
            fields.extend(self.element_fields(elements, elem, self.recursive_depth));
        }

        debug!(
            resource_type,
            field_count = fields.len(),
            "derived warehouse schema"
        );
        Ok(Arc::new(Schema::new(fields)))
    }

    /// Columns contributed by one element: none when the type cannot be
    /// projected, several for a choice element.
    fn element_fields(
        &self,
        all: &[ElementDefinition],
        elem: &ElementDefinition,
        depth: u32,
    ) -> Vec<Field> {
        let name = elem.leaf_name();
        let mut fields = Vec::new();

        if let Some(stem) = name.strip_suffix("[x]") {
            for ty in &elem.types {
                if let Some(data_type) = self.data_type(all, elem, &ty.code, depth) {
                    let column = format!("{stem}{}", upper_first(&ty.code));
                    fields.push(Field::new(column, data_type, true));
                }
            }
            return fields;
        }

        let Some(ty) = elem.types.first() else {
            return fields;
        };
        if let Some(data_type) = self.data_type(all, elem, &ty.code, depth) {
            let data_type = if elem.is_collection() {
                DataType::List(Arc::new(Field::new("item", data_type, true)))
            } else {
                data_type
            };
            fields.push(Field::new(name, data_type, true));
        }
        fields
    }

    /// Arrow type for a FHIR type code, or `None` when the element is not
    /// projected (unknown complex type, recursion bound, inline group with
    /// no projectable children).
    fn data_type(
        &self,
        all: &[ElementDefinition],
        elem: &ElementDefinition,
        code: &str,
        depth: u32,
    ) -> Option<DataType> {
        if let Some(primitive) = primitive_data_type(code) {
            return Some(primitive);
        }

        match code {
            // Inline groups: children live in the same snapshot under this
            // element's path.
            "BackboneElement" | "Element" => {
                if depth == 0 {
                    return None;
                }
                self.struct_of(all, &elem.path, depth - 1)
            }
            // Contained resources and narrative stay in resource_json only.
            "Resource" | "Narrative" | "Extension" => None,
            complex => {
                if depth == 0 {
                    return None;
                }
                let def = self.defs.get(complex).filter(|d| d.kind == "complex-type")?;
                self.struct_of(def.elements(), &def.type_name, depth - 1)
            }
        }
    }

    fn struct_of(&self, all: &[ElementDefinition], prefix: &str, depth: u32) -> Option<DataType> {
        let mut children = Vec::new();
        for child in all {
            if !child.is_direct_child_of(prefix) {
                continue;
            }
            let name = child.leaf_name();
            if name == "id" || name == "extension" || name == "modifierExtension" {
                continue;
            }
            children.extend(self.element_fields(all, child, depth));
        }
        if children.is_empty() {
            None
        } else {
            Some(DataType::Struct(Fields::from(children)))
        }
    }
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// FHIR primitive (and fhirpath system type) to Arrow mapping. Everything
/// date/time-like stays Utf8 so values round-trip byte-for-byte.
pub(crate) fn primitive_data_type(code: &str) -> Option<DataType> {
    match code {
        "boolean" | "http://hl7.org/fhirpath/System.Boolean" => Some(DataType::Boolean),
        "integer" | "positiveInt" | "unsignedInt" | "integer64"
        | "http://hl7.org/fhirpath/System.Integer" => Some(DataType::Int64),
        "decimal" | "http://hl7.org/fhirpath/System.Decimal" => Some(DataType::Float64),
        "string" | "code" | "uri" | "url" | "canonical" | "oid" | "id" | "markdown"
        | "base64Binary" | "date" | "dateTime" | "instant" | "time" | "uuid" | "xhtml"
        | "http://hl7.org/fhirpath/System.String"
        | "http://hl7.org/fhirpath/System.Date"
        | "http://hl7.org/fhirpath/System.DateTime"
        | "http://hl7.org/fhirpath/System.Time" => Some(DataType::Utf8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn write_defs(dir: &Path) {
        let patient = json!({
            "resourceType": "StructureDefinition",
            "name": "Patient",
            "type": "Patient",
            "kind": "resource",
            "snapshot": {"element": [
                {"path": "Patient", "min": 0, "max": "*"},
                {"path": "Patient.id", "min": 0, "max": "1",
                 "type": [{"code": "http://hl7.org/fhirpath/System.String"}]},
                {"path": "Patient.meta", "min": 0, "max": "1", "type": [{"code": "Meta"}]},
                {"path": "Patient.active", "min": 0, "max": "1", "type": [{"code": "boolean"}]},
                {"path": "Patient.gender", "min": 0, "max": "1", "type": [{"code": "code"}]},
                {"path": "Patient.birthDate", "min": 0, "max": "1", "type": [{"code": "date"}]},
                {"path": "Patient.name", "min": 0, "max": "*", "type": [{"code": "HumanName"}]},
                {"path": "Patient.deceased[x]", "min": 0, "max": "1",
                 "type": [{"code": "boolean"}, {"code": "dateTime"}]},
                {"path": "Patient.contact", "min": 0, "max": "*", "type": [{"code": "BackboneElement"}]},
                {"path": "Patient.contact.gender", "min": 0, "max": "1", "type": [{"code": "code"}]}
            ]}
        });
        let human_name = json!({
            "resourceType": "StructureDefinition",
            "name": "HumanName",
            "type": "HumanName",
            "kind": "complex-type",
            "snapshot": {"element": [
                {"path": "HumanName", "min": 0, "max": "*"},
                {"path": "HumanName.family", "min": 0, "max": "1", "type": [{"code": "string"}]},
                {"path": "HumanName.given", "min": 0, "max": "*", "type": [{"code": "string"}]},
                {"path": "HumanName.period", "min": 0, "max": "1", "type": [{"code": "Period"}]}
            ]}
        });
        std::fs::write(
            dir.join("patient.json"),
            serde_json::to_string_pretty(&patient).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.join("humanname.json"),
            serde_json::to_string_pretty(&human_name).unwrap(),
        )
        .unwrap();
    }

    fn registry_with_defs(depth: u32) -> (tempfile::TempDir, SchemaRegistry) {
        let dir = tempfile::tempdir().unwrap();
        write_defs(dir.path());
        let registry = SchemaRegistry::new(FhirVersion::R4, Some(dir.path()), depth).unwrap();
        (dir, registry)
    }

    #[test]
    fn test_envelope_only_without_profiles() {
        let registry = SchemaRegistry::new(FhirVersion::R4, None, 1).unwrap();
        let schema = registry.schema_for("Patient").unwrap();
        assert_eq!(schema.fields().len(), 3);
        // Any type resolves when no profiles are configured.
        assert!(registry.schema_for("Observation").is_ok());
    }

    #[test]
    fn test_derived_columns() {
        let (_dir, registry) = registry_with_defs(1);
        let schema = registry.schema_for("Patient").unwrap();

        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec![
                "id",
                "meta",
                "resource_json",
                "active",
                "gender",
                "birthDate",
                "name",
                "deceasedBoolean",
                "deceasedDateTime",
                "contact",
            ]
        );

        assert_eq!(
            schema.field_with_name("active").unwrap().data_type(),
            &DataType::Boolean
        );
        assert_eq!(
            schema.field_with_name("gender").unwrap().data_type(),
            &DataType::Utf8
        );
    }

    #[test]
    fn test_repeating_complex_type_becomes_list_of_struct() {
        let (_dir, registry) = registry_with_defs(1);
        let schema = registry.schema_for("Patient").unwrap();

        let DataType::List(item) = schema.field_with_name("name").unwrap().data_type() else {
            panic!("Patient.name must be a list");
        };
        let DataType::Struct(children) = item.data_type() else {
            panic!("HumanName must expand to a struct");
        };
        let child_names: Vec<_> = children.iter().map(|f| f.name().as_str()).collect();
        // Period has no loaded definition, so HumanName.period is omitted.
        assert_eq!(child_names, vec!["family", "given"]);
    }

    #[test]
    fn test_backbone_children_inline() {
        let (_dir, registry) = registry_with_defs(1);
        let schema = registry.schema_for("Patient").unwrap();

        let DataType::List(item) = schema.field_with_name("contact").unwrap().data_type() else {
            panic!("Patient.contact must be a list");
        };
        let DataType::Struct(children) = item.data_type() else {
            panic!("contact must be a struct");
        };
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name(), "gender");
    }

    #[test]
    fn test_depth_zero_keeps_primitives_only() {
        let (_dir, registry) = registry_with_defs(0);
        let schema = registry.schema_for("Patient").unwrap();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert!(names.contains(&"gender"));
        assert!(!names.contains(&"name"));
        assert!(!names.contains(&"contact"));
    }

    #[test]
    fn test_unknown_type_fails_when_profiles_configured() {
        let (_dir, registry) = registry_with_defs(1);
        let err = registry.schema_for("Observation").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownResourceType(t) if t == "Observation"));
    }

    #[test]
    fn test_schema_is_cached() {
        let (_dir, registry) = registry_with_defs(1);
        let first = registry.schema_for("Patient").unwrap();
        let second = registry.schema_for("Patient").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_derivation_is_deterministic_across_registries() {
        let dir = tempfile::tempdir().unwrap();
        write_defs(dir.path());
        let a = SchemaRegistry::new(FhirVersion::R4, Some(dir.path()), 1).unwrap();
        let b = SchemaRegistry::new(FhirVersion::R4, Some(dir.path()), 1).unwrap();
        assert_eq!(a.schema_for("Patient").unwrap(), b.schema_for("Patient").unwrap());
    }

    #[test]
    fn test_profile_load_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let err = SchemaRegistry::new(FhirVersion::R4, Some(dir.path()), 1).unwrap_err();
        match err {
            SchemaError::ProfileLoad { path, .. } => {
                assert_eq!(path, PathBuf::from(dir.path().join("broken.json")));
            }
            other => panic!("expected ProfileLoad, got {other:?}"),
        }
    }
}
