use thiserror::Error;

/// Core error types for FHIRLake operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Resource is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Resource is not a JSON object")]
    NotAnObject,

    #[error("Invalid FHIR instant: {0}")]
    InvalidInstant(String),

    #[error("Unknown FHIR version: {0}")]
    UnknownFhirVersion(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new MissingField error
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Create a new InvalidInstant error
    pub fn invalid_instant(instant: impl Into<String>) -> Self {
        Self::InvalidInstant(instant.into())
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message() {
        let err = CoreError::missing_field("id");
        assert_eq!(err.to_string(), "Resource is missing required field 'id'");
    }

    #[test]
    fn test_invalid_instant_message() {
        let err = CoreError::invalid_instant("not-a-date");
        assert_eq!(err.to_string(), "Invalid FHIR instant: not-a-date");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("{ bad }").unwrap_err();
        let core_err: CoreError = json_err.into();
        assert!(matches!(core_err, CoreError::Json(_)));
    }
}
