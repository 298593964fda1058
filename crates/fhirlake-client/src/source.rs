use serde_json::Value;
use tracing::{debug, warn};

use fhirlake_core::Bundle;

use crate::auth::AuthHeader;
use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;

const FHIR_JSON: &str = "application/fhir+json";

/// Client for the FHIR server resources are extracted from.
///
/// All fetches retry transient failures per the configured policy; 4xx
/// responses fail immediately.
pub struct SourceClient {
    http: reqwest::Client,
    base_url: String,
    auth: Option<AuthHeader>,
    retry: RetryPolicy,
}

impl SourceClient {
    /// `max_connections` bounds the connection pool; the pipeline passes
    /// its worker count so the pool ceiling matches the number of inflight
    /// requests.
    pub fn new(
        base_url: &str,
        auth: Option<AuthHeader>,
        retry: RetryPolicy,
        max_connections: usize,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(max_connections)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET <base>/<type>?_count=<count>[&_summary=count]`: the first
    /// page of a type search, or just its total when `summary_count`.
    pub async fn search_for_resource(
        &self,
        resource_type: &str,
        count: u32,
        summary_count: bool,
    ) -> Result<Bundle> {
        let url = format!("{}/{resource_type}", self.base_url);
        let mut params = vec![("_count".to_string(), count.to_string())];
        if summary_count {
            params.push(("_summary".to_string(), "count".to_string()));
        }
        self.get_bundle(&url, &params).await
    }

    /// `GET <base>?_getpages=<token>&_getpagesoffset=<offset>&_count=<count>`:
    /// one window of a paged search.
    pub async fn search_by_page(&self, page_token: &str, count: u32, offset: u32) -> Result<Bundle> {
        let url = self.base_url.clone();
        let params = vec![
            ("_getpages".to_string(), page_token.to_string()),
            ("_getpagesoffset".to_string(), offset.to_string()),
            ("_count".to_string(), count.to_string()),
        ];
        self.get_bundle(&url, &params).await
    }

    /// `GET <base>/<type>?_id=a,b,c`: direct fetch of known ids.
    pub async fn batch_get_by_ids(&self, resource_type: &str, ids: &[String]) -> Result<Bundle> {
        let url = format!("{}/{resource_type}", self.base_url);
        let params = vec![
            ("_id".to_string(), ids.join(",")),
            ("_count".to_string(), ids.len().to_string()),
        ];
        self.get_bundle(&url, &params).await
    }

    async fn get_bundle(&self, url: &str, params: &[(String, String)]) -> Result<Bundle> {
        let mut failures = 0u32;
        loop {
            match self.get_bundle_once(url, params).await {
                Ok(bundle) => return Ok(bundle),
                Err(e) if e.is_transient() && failures + 1 < self.retry.max_attempts => {
                    failures += 1;
                    let delay = self.retry.delay_for(failures);
                    warn!(
                        url,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient source failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_bundle_once(&self, url: &str, params: &[(String, String)]) -> Result<Bundle> {
        let req = self
            .http
            .get(url)
            .query(params)
            .header("Accept", FHIR_JSON);
        let resp = AuthHeader::apply(&self.auth, req)
            .send()
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(ClientError::Transient {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Permanent {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        let value: Value = resp.json().await?;
        debug!(url, status = status.as_u16(), "fetched bundle");
        Ok(Bundle::new(value))
    }
}
