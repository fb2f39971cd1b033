//! Authenticated HTTP client for the verification provider.
//!
//! ```text
//! operation (e.g. session_decision)
//!   └─ send(resource)
//!        ├─ signing_target(path)          // id after the resource prefix
//!        └─ up to N attempts (N = pool size):
//!             ├─ load cached defaults     // client header + the pair that signs
//!             ├─ sign id, GET
//!             ├─ 2xx       → return response
//!             ├─ 404       → NotFound, no rotation
//!             ├─ other HTTP status → rotate pool, rebuild defaults, retry
//!             └─ no response / timeout → Transport, no rotation
//! ```
//!
//! Rotating on a transport fault would burn through every credential for an error
//! none of them can fix, so only HTTP error responses rotate.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures::StreamExt;
use metrics::counter;
use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::credentials::{CredentialPair, CredentialPool};
use super::models::{AttemptList, Decision, MediaList, PersonInfo};
use super::resource::{Registry, Resource, signing_target};
use super::signing::{CLIENT_HEADER, SIGNATURE_HEADER, sign_id};
use super::{MediaStream, Result, UpstreamError, VerificationApi};
use crate::config::UpstreamConfig;

/// Per-credential request defaults, rebuilt whenever the pool rotates.
///
/// The pair travels with the headers so a request always signs with the same
/// credential whose public key it sends, even if another call rotates meanwhile.
#[derive(Debug)]
struct RequestDefaults {
    index: usize,
    credential: CredentialPair,
    headers: HeaderMap,
}

impl RequestDefaults {
    fn build(index: usize, credential: &CredentialPair) -> Result<Self> {
        let client_id = HeaderValue::from_str(&credential.public_key)
            .map_err(|_| UpstreamError::Configuration(format!("credential {index} has a public key that is not a valid header value")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_HEADER, client_id);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            index,
            credential: credential.clone(),
            headers,
        })
    }
}

/// Response shape the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Json,
    Binary,
}

impl Expect {
    fn accept(self) -> &'static str {
        match self {
            Expect::Json => "application/json",
            Expect::Binary => "*/*",
        }
    }
}

pub struct UpstreamClient {
    http: Client,
    base_url: Url,
    api_version: String,
    pool: Arc<CredentialPool>,
    defaults: ArcSwap<RequestDefaults>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, pool: Arc<CredentialPool>) -> Result<Self> {
        if config.base_url.cannot_be_a_base() {
            return Err(UpstreamError::Configuration(format!("{} cannot be used as a base URL", config.base_url)));
        }

        // Fail at startup rather than on the first rotation onto a bad pair.
        for (index, pair) in pool.pairs().iter().enumerate() {
            RequestDefaults::build(index, pair)?;
        }
        let (index, pair) = pool.snapshot();
        let defaults = ArcSwap::from_pointee(RequestDefaults::build(index, pair)?);

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| UpstreamError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_version: config.api_version.clone(),
            pool,
            defaults,
        })
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    fn url_for(&self, resource: &Resource) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| UpstreamError::InvalidPath(resource.to_string()))?;
            segments.pop_if_empty();
            if !self.api_version.is_empty() {
                segments.push(&self.api_version);
            }
            segments.extend(resource.segments());
        }
        if let Some(version) = resource.version() {
            url.query_pairs_mut().append_pair("version", version);
        }
        Ok(url)
    }

    /// Defaults for the pool's active credential, rebuilding the cache if a
    /// concurrent rotation left it behind the cursor.
    fn active_defaults(&self) -> Result<Arc<RequestDefaults>> {
        let cached = self.defaults.load_full();
        let (index, pair) = self.pool.snapshot();
        if cached.index == index {
            return Ok(cached);
        }
        let fresh = Arc::new(RequestDefaults::build(index, pair)?);
        self.defaults.store(fresh.clone());
        Ok(fresh)
    }

    fn rotate(&self) -> Result<()> {
        self.pool.rotate();
        counter!("idsync_credential_rotations_total").increment(1);
        let (index, pair) = self.pool.snapshot();
        self.defaults.store(Arc::new(RequestDefaults::build(index, pair)?));
        Ok(())
    }

    /// Issue one logical call, retrying across the pool on HTTP error responses.
    #[instrument(skip(self), fields(resource = %resource))]
    async fn send(&self, resource: &Resource, expect: Expect) -> Result<Response> {
        let path = resource.path();
        let signing_id = match signing_target(&path) {
            Some((_, id)) if id == resource.id() => id,
            _ => return Err(UpstreamError::InvalidPath(path)),
        };
        let url = self.url_for(resource)?;
        let label = resource.label();

        let attempts = self.pool.len();
        let mut last_rejection = None;

        for attempt in 1..=attempts {
            let defaults = self.active_defaults()?;
            let signature = sign_id(signing_id, &defaults.credential.shared_secret);

            debug!(url = %url, attempt, credential = defaults.index, ?expect, "Calling upstream");

            let response = match self
                .http
                .get(url.clone())
                .headers(defaults.headers.clone())
                .header(ACCEPT, expect.accept())
                .header(SIGNATURE_HEADER, signature)
                .send()
                .await
            {
                Ok(response) => response,
                Err(source) => {
                    warn!(attempt, credential = defaults.index, error = %source, "Upstream call failed without a response");
                    counter!("idsync_upstream_requests_total", "resource" => label, "outcome" => "transport").increment(1);
                    return Err(UpstreamError::Transport {
                        resource: resource.to_string(),
                        source,
                    });
                }
            };

            let status = response.status();
            if status.is_success() {
                counter!("idsync_upstream_requests_total", "resource" => label, "outcome" => "success").increment(1);
                return Ok(response);
            }

            if status == StatusCode::NOT_FOUND {
                debug!(attempt, "Upstream has no data for resource");
                counter!("idsync_upstream_requests_total", "resource" => label, "outcome" => "not_found").increment(1);
                return Err(UpstreamError::NotFound {
                    resource: resource.to_string(),
                });
            }

            // A rejection only counts once its body has been read in full
            let body = match response.text().await {
                Ok(body) => body,
                Err(source) => {
                    warn!(attempt, credential = defaults.index, status = status.as_u16(), error = %source, "Failed to read upstream error body");
                    counter!("idsync_upstream_requests_total", "resource" => label, "outcome" => "transport").increment(1);
                    return Err(UpstreamError::Transport {
                        resource: resource.to_string(),
                        source,
                    });
                }
            };
            warn!(
                attempt,
                attempts,
                credential = defaults.index,
                status = status.as_u16(),
                body = %body,
                "Upstream rejected request, rotating credential"
            );
            counter!("idsync_upstream_requests_total", "resource" => label.clone(), "outcome" => "rejected").increment(1);
            self.rotate()?;
            last_rejection = Some((status, body));
        }

        let (status, body) = last_rejection.unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, String::new()));
        warn!(attempts, status = status.as_u16(), "All credentials exhausted for upstream call");
        counter!("idsync_upstream_requests_total", "resource" => label, "outcome" => "exhausted").increment(1);
        Err(UpstreamError::Exhausted {
            resource: resource.to_string(),
            attempts,
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, resource: Resource) -> Result<T> {
        let response = self.send(&resource, Expect::Json).await?;
        let body = response.bytes().await.map_err(|source| UpstreamError::Transport {
            resource: resource.to_string(),
            source,
        })?;

        serde_json::from_slice(&body).map_err(|source| {
            tracing::error!(resource = %resource, error = %source, body = %String::from_utf8_lossy(&body), "Failed to decode upstream response");
            UpstreamError::Decode {
                resource: resource.to_string(),
                source,
            }
        })
    }

    async fn get_stream(&self, resource: Resource) -> Result<MediaStream> {
        let response = self.send(&resource, Expect::Binary).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        Ok(MediaStream::new(resource.to_string(), content_type, response.bytes_stream().boxed()))
    }
}

#[async_trait]
impl VerificationApi for UpstreamClient {
    async fn session_decision(&self, session_id: &str) -> Result<Decision> {
        let resource = Resource::session_decision(session_id);
        let decision: Decision = self.get_json(resource.clone()).await?;
        // The provider answers 200 with a null verification until it has decided.
        if decision.verification.is_none() {
            return Err(UpstreamError::NotFound {
                resource: resource.to_string(),
            });
        }
        Ok(decision)
    }

    async fn session_person(&self, session_id: &str) -> Result<PersonInfo> {
        self.get_json(Resource::session_person(session_id)).await
    }

    async fn session_media(&self, session_id: &str) -> Result<MediaList> {
        self.get_json(Resource::session_media(session_id)).await
    }

    async fn session_watchlist(&self, session_id: &str) -> Result<Value> {
        self.get_json(Resource::session_watchlist(session_id)).await
    }

    async fn registry_check(&self, registry: Registry, session_id: &str, version: &str) -> Result<Value> {
        self.get_json(Resource::registry_check(registry, session_id, version)).await
    }

    async fn session_attempts(&self, session_id: &str) -> Result<AttemptList> {
        self.get_json(Resource::session_attempts(session_id)).await
    }

    async fn attempt_media(&self, attempt_id: &str) -> Result<MediaList> {
        self.get_json(Resource::attempt_media(attempt_id)).await
    }

    async fn media(&self, media_id: &str) -> Result<MediaStream> {
        self.get_stream(Resource::media(media_id)).await
    }

    async fn address_media(&self, address_id: &str) -> Result<MediaList> {
        self.get_json(Resource::address_media_list(address_id)).await
    }

    async fn address_media_blob(&self, media_id: &str) -> Result<MediaStream> {
        self.get_stream(Resource::address_media(media_id)).await
    }
}
