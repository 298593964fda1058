//! The table↔resource mapping that drives direct-database extraction.
//!
//! The mapping file is a JSON array of entries, one per source table:
//!
//! ```json
//! [
//!   {"tableName": "patient", "resourceType": "Patient"},
//!   {"tableName": "encounter", "resourceType": "Encounter", "linkedResources": ["Visit"]},
//!   {"tableName": "visit", "resourceType": "Visit"}
//! ]
//! ```
//!
//! Requesting a resource type selects its tables plus, transitively, the
//! tables of every linked resource type: the encounter entry above pulls
//! in the visit table without the operator asking for it.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{DbError, Result};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableMapping {
    pub table_name: String,
    pub resource_type: String,
    #[serde(default)]
    pub linked_resources: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TableFhirMap {
    entries: Vec<TableMapping>,
}

impl TableFhirMap {
    pub fn new(entries: Vec<TableMapping>) -> Result<Self> {
        for entry in &entries {
            if !is_plain_identifier(&entry.table_name) {
                return Err(DbError::InvalidTableName(entry.table_name.clone()));
            }
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| DbError::mapping_load(path, e.to_string()))?;
        let entries: Vec<TableMapping> = serde_json::from_str(&content)
            .map_err(|e| DbError::mapping_load(path, e.to_string()))?;
        debug!(path = %path.display(), entries = entries.len(), "loaded table-FHIR mapping");
        Self::new(entries)
    }

    /// The tables to scan for one requested resource type: its own tables
    /// plus the transitive closure over `linkedResources`. Fails fast when
    /// the requested type itself is unmapped.
    pub fn tables_for(&self, resource_type: &str) -> Result<Vec<&TableMapping>> {
        if !self.entries.iter().any(|e| e.resource_type == resource_type) {
            return Err(DbError::UnmappedResource(resource_type.to_string()));
        }

        let mut queue = vec![resource_type.to_string()];
        let mut seen_types = HashSet::new();
        let mut tables = Vec::new();
        let mut seen_tables = HashSet::new();

        while let Some(ty) = queue.pop() {
            if !seen_types.insert(ty.clone()) {
                continue;
            }
            for entry in self.entries.iter().filter(|e| e.resource_type == ty) {
                if seen_tables.insert(entry.table_name.as_str()) {
                    tables.push(entry);
                }
                for linked in &entry.linked_resources {
                    queue.push(linked.clone());
                }
            }
        }

        Ok(tables)
    }
}

fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> TableFhirMap {
        TableFhirMap::new(vec![
            TableMapping {
                table_name: "patient".into(),
                resource_type: "Patient".into(),
                linked_resources: vec![],
            },
            TableMapping {
                table_name: "encounter".into(),
                resource_type: "Encounter".into(),
                linked_resources: vec!["Visit".into()],
            },
            TableMapping {
                table_name: "visit".into(),
                resource_type: "Visit".into(),
                linked_resources: vec![],
            },
            TableMapping {
                table_name: "obs".into(),
                resource_type: "Observation".into(),
                linked_resources: vec![],
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_direct_lookup() {
        let map = sample_map();
        let tables = map.tables_for("Patient").unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table_name, "patient");
    }

    #[test]
    fn test_linked_tables_included_transitively() {
        let map = sample_map();
        let tables: Vec<_> = map
            .tables_for("Encounter")
            .unwrap()
            .iter()
            .map(|t| t.table_name.as_str())
            .collect();
        assert_eq!(tables, vec!["encounter", "visit"]);
    }

    #[test]
    fn test_unmapped_resource_fails_fast() {
        let map = sample_map();
        assert!(matches!(
            map.tables_for("Medication"),
            Err(DbError::UnmappedResource(t)) if t == "Medication"
        ));
    }

    #[test]
    fn test_linked_cycle_terminates() {
        let map = TableFhirMap::new(vec![
            TableMapping {
                table_name: "a".into(),
                resource_type: "A".into(),
                linked_resources: vec!["B".into()],
            },
            TableMapping {
                table_name: "b".into(),
                resource_type: "B".into(),
                linked_resources: vec!["A".into()],
            },
        ])
        .unwrap();
        let tables = map.tables_for("A").unwrap();
        assert_eq!(tables.len(), 2);
    }

    #[test]
    fn test_rejects_hostile_table_name() {
        let result = TableFhirMap::new(vec![TableMapping {
            table_name: "patient; DROP TABLE".into(),
            resource_type: "Patient".into(),
            linked_resources: vec![],
        }]);
        assert!(matches!(result, Err(DbError::InvalidTableName(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(
            &path,
            r#"[{"tableName": "patient", "resourceType": "Patient"}]"#,
        )
        .unwrap();
        let map = TableFhirMap::load(&path).unwrap();
        assert_eq!(map.tables_for("Patient").unwrap().len(), 1);
    }

    #[test]
    fn test_load_bad_json_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            TableFhirMap::load(&path),
            Err(DbError::MappingLoad { .. })
        ));
    }
}
