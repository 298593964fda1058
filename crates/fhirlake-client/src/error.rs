use thiserror::Error;

/// Errors from the source and mirror FHIR clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// 5xx from the server; worth retrying.
    #[error("Server error (HTTP {status}) from {url}")]
    Transient { status: u16, url: String },

    /// Could not reach the server at all; worth retrying.
    #[error("Connection error: {0}")]
    Connect(String),

    /// 4xx, a configuration or credential problem; retrying won't help.
    #[error("Request rejected (HTTP {status}) from {url}: {body}")]
    Permanent {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Bundle has no 'next' link")]
    NoNextLink,

    #[error("Bundle 'next' link is not a valid URL: {0}")]
    MalformedLink(String),

    #[error("Bundle 'next' link carries no _getpages parameter: {0}")]
    MissingGetpagesParam(String),

    #[error("Resource cannot be uploaded: {0}")]
    InvalidResource(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether a retry with backoff can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Connect(_))
    }
}

/// Convenience result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let transient = ClientError::Transient {
            status: 503,
            url: "http://fhir.example.org/Patient".into(),
        };
        let permanent = ClientError::Permanent {
            status: 401,
            url: "http://fhir.example.org/Patient".into(),
            body: "unauthorized".into(),
        };
        assert!(transient.is_transient());
        assert!(ClientError::Connect("refused".into()).is_transient());
        assert!(!permanent.is_transient());
        assert!(!ClientError::NoNextLink.is_transient());
    }
}
