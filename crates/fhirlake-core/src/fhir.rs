use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// FHIR specification versions the extraction pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FhirVersion {
    #[default]
    R4,
    Dstu3,
}

impl FhirVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::R4 => "R4",
            Self::Dstu3 => "DSTU3",
        }
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FhirVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "r4" => Ok(Self::R4),
            "dstu3" | "stu3" => Ok(Self::Dstu3),
            other => Err(CoreError::UnknownFhirVersion(other.to_string())),
        }
    }
}
