//! Client side of the verification provider's API.
//!
//! - [`signing`]: HMAC-SHA256 digests for outbound requests and inbound webhooks
//! - [`credentials`]: credential pairs and the rotating pool
//! - [`resource`]: resource path templates and signing identifier extraction
//! - [`client`]: authenticated calls with retry-by-rotation
//! - [`models`]: response bodies

pub mod client;
pub mod credentials;
pub mod models;
pub mod resource;
pub mod signing;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream::BoxStream};
use serde_json::Value;
use std::fmt;

pub use client::UpstreamClient;
pub use credentials::{CredentialPair, CredentialPool};
pub use models::{Attempt, AttemptList, Decision, MediaItem, MediaList, Person, PersonInfo, Verification};
pub use resource::{Registry, Resource, ResourceKind};

/// Result type for upstream operations
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// Ways an upstream call can fail.
///
/// None of these are program errors: callers treat every variant as "data
/// temporarily or permanently unavailable".
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Every credential in the pool was rejected for one logical call
    #[error("{resource}: rejected by all {attempts} credentials, last status {status}")]
    Exhausted {
        resource: String,
        attempts: usize,
        status: u16,
        body: String,
    },

    /// No response was obtained (connect failure, timeout, broken body)
    #[error("{resource}: transport error: {source}")]
    Transport {
        resource: String,
        #[source]
        source: reqwest::Error,
    },

    /// The provider has no data for this resource, or not yet
    #[error("{resource}: not found")]
    NotFound { resource: String },

    #[error("{resource}: failed to decode response: {source}")]
    Decode {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid resource path: {0}")]
    InvalidPath(String),

    #[error("invalid client configuration: {0}")]
    Configuration(String),
}

impl UpstreamError {
    /// Short metric label for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Exhausted { .. } => "exhausted",
            UpstreamError::Transport { .. } => "transport",
            UpstreamError::NotFound { .. } => "not_found",
            UpstreamError::Decode { .. } => "decode",
            UpstreamError::InvalidPath(_) | UpstreamError::Configuration(_) => "invalid",
        }
    }
}

/// A binary response body that has not been read yet.
///
/// The caller owns the stream and is responsible for draining it, usually via
/// [`MediaStream::collect`].
pub struct MediaStream {
    resource: String,
    pub content_type: String,
    pub stream: BoxStream<'static, reqwest::Result<Bytes>>,
}

impl MediaStream {
    pub fn new(resource: impl Into<String>, content_type: impl Into<String>, stream: BoxStream<'static, reqwest::Result<Bytes>>) -> Self {
        Self {
            resource: resource.into(),
            content_type: content_type.into(),
            stream,
        }
    }

    /// Drain the stream into memory.
    pub async fn collect(mut self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.stream.next().await {
            let chunk = chunk.map_err(|source| UpstreamError::Transport {
                resource: self.resource.clone(),
                source,
            })?;
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("resource", &self.resource)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// The provider operations the rest of the service depends on.
///
/// [`UpstreamClient`] is the production implementation; tests substitute fakes.
#[async_trait]
pub trait VerificationApi: Send + Sync {
    async fn session_decision(&self, session_id: &str) -> Result<Decision>;

    async fn session_person(&self, session_id: &str) -> Result<PersonInfo>;

    async fn session_media(&self, session_id: &str) -> Result<MediaList>;

    async fn session_watchlist(&self, session_id: &str) -> Result<Value>;

    /// Registry check, with the version query-encoded.
    async fn registry_check(&self, registry: Registry, session_id: &str, version: &str) -> Result<Value>;

    async fn session_attempts(&self, session_id: &str) -> Result<AttemptList>;

    async fn attempt_media(&self, attempt_id: &str) -> Result<MediaList>;

    async fn media(&self, media_id: &str) -> Result<MediaStream>;

    async fn address_media(&self, address_id: &str) -> Result<MediaList>;

    async fn address_media_blob(&self, media_id: &str) -> Result<MediaStream>;
}
