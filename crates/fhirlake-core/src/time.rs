use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{CoreError, Result};

/// Parse a FHIR instant (RFC 3339) into an [`OffsetDateTime`].
pub fn parse_instant(s: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| CoreError::invalid_instant(format!("'{s}': {e}")))
}

/// Check that a string is a well-formed FHIR instant without keeping the parse.
pub fn validate_instant(s: &str) -> Result<()> {
    parse_instant(s).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_parse_instant_utc() {
        let parsed = parse_instant("2024-05-15T14:30:00Z").unwrap();
        assert_eq!(parsed, datetime!(2024-05-15 14:30:00 UTC));
    }

    #[test]
    fn test_parse_instant_with_offset() {
        let parsed = parse_instant("2024-05-15T14:30:00+02:00").unwrap();
        assert_eq!(
            parsed.to_offset(time::UtcOffset::UTC),
            datetime!(2024-05-15 12:30:00 UTC)
        );
    }

    #[test]
    fn test_parse_instant_subsecond() {
        assert!(parse_instant("2024-05-15T14:30:00.123Z").is_ok());
    }

    #[test]
    fn test_parse_instant_invalid() {
        assert!(parse_instant("2024-13-01T00:00:00Z").is_err());
        assert!(parse_instant("yesterday").is_err());
        assert!(parse_instant("").is_err());
    }

    #[test]
    fn test_validate_instant_error_contains_input() {
        match validate_instant("bogus") {
            Err(CoreError::InvalidInstant(msg)) => assert!(msg.contains("bogus")),
            other => panic!("expected InvalidInstant, got {other:?}"),
        }
    }
}
