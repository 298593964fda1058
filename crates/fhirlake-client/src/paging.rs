//! `_getpages` continuation parsing.
//!
//! A paged search bundle carries its continuation cursor in the `next`
//! link's `_getpages` query parameter; the planner turns that single
//! cursor into every segment of the run.

use fhirlake_core::Bundle;
use url::Url;

use crate::error::{ClientError, Result};

/// The `_getpages=<token>` parameter from the bundle's `next` link,
/// returned verbatim.
pub fn next_pages_param(bundle: &Bundle) -> Result<String> {
    let token = next_page_token(bundle)?;
    Ok(format!("_getpages={token}"))
}

/// The bare `_getpages` token from the bundle's `next` link.
pub fn next_page_token(bundle: &Bundle) -> Result<String> {
    let link = bundle.next_link().ok_or(ClientError::NoNextLink)?;
    let url = Url::parse(link).map_err(|_| ClientError::MalformedLink(link.to_string()))?;
    url.query_pairs()
        .find(|(key, _)| key == "_getpages")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| ClientError::MissingGetpagesParam(link.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle_with_next(url: &str) -> Bundle {
        Bundle::new(json!({
            "resourceType": "Bundle",
            "link": [{"relation": "next", "url": url}]
        }))
    }

    #[test]
    fn test_token_extraction() {
        let bundle = bundle_with_next(
            "http://fhir.example.org?_getpages=4a1b6357-13f8-4930&_getpagesoffset=10&_count=10",
        );
        assert_eq!(next_page_token(&bundle).unwrap(), "4a1b6357-13f8-4930");
        assert_eq!(
            next_pages_param(&bundle).unwrap(),
            "_getpages=4a1b6357-13f8-4930"
        );
    }

    #[test]
    fn test_no_next_link() {
        let bundle = Bundle::new(json!({"resourceType": "Bundle", "link": []}));
        assert!(matches!(
            next_page_token(&bundle),
            Err(ClientError::NoNextLink)
        ));
    }

    #[test]
    fn test_malformed_link() {
        let bundle = bundle_with_next("::not a url::");
        assert!(matches!(
            next_page_token(&bundle),
            Err(ClientError::MalformedLink(_))
        ));
    }

    #[test]
    fn test_missing_getpages_param() {
        let bundle = bundle_with_next("http://fhir.example.org/Patient?_count=10");
        assert!(matches!(
            next_page_token(&bundle),
            Err(ClientError::MissingGetpagesParam(_))
        ));
    }
}
