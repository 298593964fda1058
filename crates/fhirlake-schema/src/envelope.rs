//! The fixed envelope every warehouse schema starts with.
//!
//! Field names mirror the FHIR JSON document (`versionId`, `lastUpdated`)
//! so the sink can decode resources without renaming; `resource_json` uses
//! a snake_case underscore precisely because FHIR element names never do,
//! making a collision with resource content impossible.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Fields, Schema, SchemaRef};

pub const COL_ID: &str = "id";
pub const COL_META: &str = "meta";
pub const COL_RESOURCE_JSON: &str = "resource_json";
pub const COL_VERSION_ID: &str = "versionId";
pub const COL_LAST_UPDATED: &str = "lastUpdated";
pub const COL_TAG: &str = "tag";
pub const COL_TAG_SYSTEM: &str = "system";
pub const COL_TAG_CODE: &str = "code";

/// Key columns materialized view tables must carry to be mergeable.
pub const VIEW_COL_ID: &str = "id";
pub const VIEW_COL_LAST_UPDATED: &str = "last_updated";

fn meta_data_type() -> DataType {
    let tag_struct = DataType::Struct(Fields::from(vec![
        Field::new(COL_TAG_SYSTEM, DataType::Utf8, true),
        Field::new(COL_TAG_CODE, DataType::Utf8, true),
    ]));
    DataType::Struct(Fields::from(vec![
        Field::new(COL_VERSION_ID, DataType::Utf8, true),
        Field::new(COL_LAST_UPDATED, DataType::Utf8, true),
        Field::new(
            COL_TAG,
            DataType::List(Arc::new(Field::new("item", tag_struct, true))),
            true,
        ),
    ]))
}

/// The three columns present in every resource-type schema, in order.
pub fn envelope_fields() -> Vec<Field> {
    vec![
        Field::new(COL_ID, DataType::Utf8, false),
        Field::new(COL_META, meta_data_type(), true),
        Field::new(COL_RESOURCE_JSON, DataType::Utf8, false),
    ]
}

/// The schema used when no structure definitions are configured.
pub fn envelope_schema() -> SchemaRef {
    Arc::new(Schema::new(envelope_fields()))
}
