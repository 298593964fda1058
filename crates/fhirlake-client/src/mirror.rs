use serde_json::Value;
use tracing::{debug, warn};

use fhirlake_core::{Bundle, RawResource};

use crate::auth::AuthHeader;
use crate::error::{ClientError, Result};

const FHIR_JSON: &str = "application/fhir+json";

/// Outcome of mirroring one bundle: upload failures are counted, never
/// fatal to the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub uploaded: u64,
    pub failed: u64,
}

/// Client for the optional mirror FHIR server. Resources are written with
/// FHIR update semantics: `PUT <base>/<type>/<id>`.
pub struct MirrorClient {
    http: reqwest::Client,
    base_url: String,
    auth: Option<AuthHeader>,
}

impl MirrorClient {
    pub fn new(base_url: &str, auth: Option<AuthHeader>, max_connections: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(max_connections)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Upload every entry of a bundle. Entries without an id or type are
    /// counted as failed; so is any non-2xx response.
    pub async fn upload_bundle(&self, bundle: &Bundle) -> UploadOutcome {
        let mut outcome = UploadOutcome::default();
        for entry in bundle.entries() {
            match self.upload_resource(entry).await {
                Ok(()) => outcome.uploaded += 1,
                Err(e) => {
                    outcome.failed += 1;
                    warn!(error = %e, "mirror upload failed");
                }
            }
        }
        outcome
    }

    async fn upload_resource(&self, resource: &Value) -> Result<()> {
        let raw = RawResource::new(resource.clone())
            .map_err(|e| ClientError::InvalidResource(e.to_string()))?;
        let id = raw
            .require_id()
            .map_err(|e| ClientError::InvalidResource(e.to_string()))?;
        let resource_type = raw
            .require_resource_type()
            .map_err(|e| ClientError::InvalidResource(e.to_string()))?;

        let url = format!("{}/{resource_type}/{id}", self.base_url);
        let req = self
            .http
            .put(&url)
            .header("Content-Type", FHIR_JSON)
            .header("Accept", FHIR_JSON)
            .json(resource);
        let resp = AuthHeader::apply(&self.auth, req)
            .send()
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Permanent {
                status: status.as_u16(),
                url,
                body,
            });
        }
        debug!(url = %url, "mirrored resource");
        Ok(())
    }
}
