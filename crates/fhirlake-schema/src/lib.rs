pub mod envelope;
pub mod error;
pub mod registry;
pub mod structure_definition;
pub mod view_definition;

pub use envelope::{
    COL_ID, COL_LAST_UPDATED, COL_META, COL_RESOURCE_JSON, COL_TAG, COL_TAG_CODE, COL_TAG_SYSTEM,
    COL_VERSION_ID, VIEW_COL_ID, VIEW_COL_LAST_UPDATED, envelope_fields, envelope_schema,
};
pub use error::{Result, SchemaError};
pub use registry::SchemaRegistry;
pub use structure_definition::StructureDefinition;
pub use view_definition::{ViewColumn, ViewDefinition, load_view_definitions, view_schema};
