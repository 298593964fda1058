pub mod bundle;
pub mod error;
pub mod fhir;
pub mod resource;
pub mod time;

pub use bundle::Bundle;
pub use error::{CoreError, Result};
pub use fhir::FhirVersion;
pub use resource::{RawResource, REMOVE_TAG_CODE, REMOVE_TAG_SYSTEM};
pub use time::{parse_instant, validate_instant};
