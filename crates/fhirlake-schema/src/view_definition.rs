//! SQL-on-FHIR ViewDefinition parsing and view schema derivation.
//!
//! The merger consumes view tables that were already materialized next to
//! the resource tables; the ViewDefinition supplies their column layout.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::Deserialize;
use tracing::debug;

use crate::envelope::VIEW_COL_ID;
use crate::error::{Result, SchemaError};
use crate::registry::primitive_data_type;

/// A ViewDefinition resource that defines a tabular view over FHIR data.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDefinition {
    pub resource_type: String,

    /// Human-readable name; doubles as the view's table directory name.
    pub name: String,

    /// The FHIR resource type this view is based on.
    pub resource: String,

    #[serde(default)]
    pub select: Vec<ViewSelect>,
}

/// A select clause: columns at this level plus nested selects.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSelect {
    #[serde(default)]
    pub column: Vec<ViewColumn>,

    #[serde(default)]
    pub select: Vec<ViewSelect>,

    #[serde(default)]
    pub union_all: Vec<ViewSelect>,
}

/// A column definition in a ViewDefinition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewColumn {
    pub name: String,

    pub path: String,

    /// Declared FHIR type; absent means string.
    #[serde(rename = "type")]
    pub col_type: Option<String>,
}

impl ViewDefinition {
    /// All columns in declaration order, nested selects flattened.
    pub fn flat_columns(&self) -> Vec<&ViewColumn> {
        fn walk<'a>(selects: &'a [ViewSelect], out: &mut Vec<&'a ViewColumn>) {
            for select in selects {
                out.extend(select.column.iter());
                walk(&select.select, out);
                walk(&select.union_all, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.select, &mut out);
        out
    }
}

/// Derive the Arrow schema a materialized view table is written with.
/// Mergeable views must declare an `id` column.
pub fn view_schema(view: &ViewDefinition) -> Result<SchemaRef> {
    let columns = view.flat_columns();
    if !columns.iter().any(|c| c.name == VIEW_COL_ID) {
        return Err(SchemaError::ViewMissingId(view.name.clone()));
    }

    let fields: Vec<Field> = columns
        .iter()
        .map(|c| {
            let data_type = c
                .col_type
                .as_deref()
                .and_then(primitive_data_type)
                .unwrap_or(DataType::Utf8);
            Field::new(&c.name, data_type, true)
        })
        .collect();

    debug!(view = %view.name, columns = fields.len(), "derived view schema");
    Ok(Arc::new(Schema::new(fields)))
}

/// Load every ViewDefinition JSON document in a directory, sorted by file
/// name so downstream processing order is stable.
pub fn load_view_definitions(dir: &Path) -> Result<Vec<ViewDefinition>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut views = Vec::new();
    for path in paths {
        let content =
            fs::read_to_string(&path).map_err(|e| SchemaError::view_load(&path, e.to_string()))?;
        let doc: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| SchemaError::view_load(&path, e.to_string()))?;
        if doc.get("resourceType").and_then(|v| v.as_str()) != Some("ViewDefinition") {
            continue;
        }
        let view: ViewDefinition = serde_json::from_value(doc)
            .map_err(|e| SchemaError::view_load(&path, e.to_string()))?;
        views.push(view);
    }
    Ok(views)
}
