//! Test doubles and fixtures shared by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{Map, Value, json};
use url::Url;

use crate::config::UpstreamConfig;
use crate::upload::{self, FolderId, Uploader, sanitize_name};
use crate::upstream::{
    Attempt, AttemptList, CredentialPair, CredentialPool, Decision, MediaItem, MediaList, MediaStream, Person, PersonInfo, Registry,
    UpstreamError, VerificationApi, Verification,
};

/// A pool of `(public_key, shared_secret)` pairs, first one active.
pub fn pool_of(pairs: &[(&str, &str)]) -> Arc<CredentialPool> {
    let pairs = pairs.iter().map(|(key, secret)| CredentialPair::new(*key, *secret)).collect();
    Arc::new(CredentialPool::new(pairs).expect("test pool must not be empty"))
}

/// Upstream settings pointing at a mock server.
pub fn upstream_config(base_url: &str) -> UpstreamConfig {
    crate::install_crypto_provider();
    UpstreamConfig {
        base_url: Url::parse(base_url).expect("mock server url"),
        api_version: "v1".to_string(),
        registry_version: "1.0".to_string(),
        request_timeout: Duration::from_secs(5),
    }
}

/// In-memory [`VerificationApi`] that records every call it receives.
///
/// Call names look like `decision:{id}` or `registry:ine:{id}:{version}`; failures
/// are keyed by the call name without the id (`person`, `registry:curp`) or, for
/// per-item calls, with it (`attempt_media:{id}`, `blob:{id}`).
#[derive(Default)]
pub struct FakeApi {
    person: Option<(String, String)>,
    attempts: Vec<String>,
    media: HashMap<String, Vec<MediaItem>>,
    failing: HashSet<String>,
    fail_everything: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_person(mut self, first_name: &str, last_name: &str) -> Self {
        self.person = Some((first_name.to_string(), last_name.to_string()));
        self
    }

    pub fn with_attempts(mut self, ids: &[&str]) -> Self {
        self.attempts = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Media listed for an attempt or address, as `(id, context, mime type)`.
    pub fn with_media(mut self, owner_id: &str, items: &[(&str, &str, &str)]) -> Self {
        let items = items
            .iter()
            .map(|(id, context, mime_type)| MediaItem {
                id: id.to_string(),
                context: context.to_string(),
                name: context.to_string(),
                duration_seconds: None,
                url: format!("https://provider.test/media/{id}"),
                size_bytes: 0,
                mime_type: mime_type.to_string(),
            })
            .collect();
        self.media.insert(owner_id.to_string(), items);
        self
    }

    pub fn failing(mut self, call: &str) -> Self {
        self.failing.insert(call.to_string());
        self
    }

    pub fn failing_everything(mut self) -> Self {
        self.fail_everything = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls received so far, in dispatch order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    async fn enter(&self, call: String, failure_key: &str) -> Result<(), UpstreamError> {
        self.calls.lock().expect("calls lock").push(call.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_everything || self.failing.contains(failure_key) {
            return Err(UpstreamError::Exhausted {
                resource: call,
                attempts: 2,
                status: 401,
                body: "unauthorized".to_string(),
            });
        }
        Ok(())
    }

    fn media_list(&self, owner_id: &str) -> MediaList {
        let (videos, images): (Vec<MediaItem>, Vec<MediaItem>) = self
            .media
            .get(owner_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .partition(|item| item.mime_type.starts_with("video/"));
        MediaList {
            status: "success".to_string(),
            videos,
            images,
            extra: Map::new(),
        }
    }

    fn blob(&self, media_id: &str, body: String) -> MediaStream {
        let content_type = self
            .media
            .values()
            .flatten()
            .find(|item| item.id == media_id)
            .map(|item| item.mime_type.clone())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let chunks = vec![Ok(Bytes::from(body))];
        MediaStream::new(format!("media/{media_id}"), content_type, futures::stream::iter(chunks).boxed())
    }
}

#[async_trait]
impl VerificationApi for FakeApi {
    async fn session_decision(&self, session_id: &str) -> Result<Decision, UpstreamError> {
        self.enter(format!("decision:{session_id}"), "decision").await?;
        Ok(Decision {
            status: "success".to_string(),
            verification: Some(Verification {
                id: session_id.to_string(),
                status: Some("approved".to_string()),
                code: Some(9001),
                extra: Map::new(),
            }),
            extra: Map::new(),
        })
    }

    async fn session_person(&self, session_id: &str) -> Result<PersonInfo, UpstreamError> {
        self.enter(format!("person:{session_id}"), "person").await?;
        let (first_name, last_name) = self.person.clone().unzip();
        Ok(PersonInfo {
            status: "success".to_string(),
            person: Person {
                first_name,
                last_name,
                extra: Map::new(),
            },
            extra: Map::new(),
        })
    }

    async fn session_media(&self, session_id: &str) -> Result<MediaList, UpstreamError> {
        self.enter(format!("media:{session_id}"), "media").await?;
        Ok(self.media_list(session_id))
    }

    async fn session_watchlist(&self, session_id: &str) -> Result<Value, UpstreamError> {
        self.enter(format!("watchlist:{session_id}"), "watchlist").await?;
        Ok(json!({"status": "success", "data": {"hits": []}}))
    }

    async fn registry_check(&self, registry: Registry, session_id: &str, version: &str) -> Result<Value, UpstreamError> {
        let key = format!("registry:{}", registry.as_str());
        self.enter(format!("{key}:{session_id}:{version}"), &key).await?;
        Ok(json!({"status": "success", "registry": registry.as_str(), "valid": true}))
    }

    async fn session_attempts(&self, session_id: &str) -> Result<AttemptList, UpstreamError> {
        self.enter(format!("attempts:{session_id}"), "attempts").await?;
        Ok(AttemptList {
            status: "success".to_string(),
            verifications: self
                .attempts
                .iter()
                .map(|id| Attempt {
                    id: id.clone(),
                    status: Some("submitted".to_string()),
                    extra: Map::new(),
                })
                .collect(),
            extra: Map::new(),
        })
    }

    async fn attempt_media(&self, attempt_id: &str) -> Result<MediaList, UpstreamError> {
        self.enter(format!("attempt_media:{attempt_id}"), &format!("attempt_media:{attempt_id}"))
            .await?;
        Ok(self.media_list(attempt_id))
    }

    async fn media(&self, media_id: &str) -> Result<MediaStream, UpstreamError> {
        self.enter(format!("blob:{media_id}"), &format!("blob:{media_id}")).await?;
        Ok(self.blob(media_id, format!("blob:{media_id}")))
    }

    async fn address_media(&self, address_id: &str) -> Result<MediaList, UpstreamError> {
        self.enter(format!("address_media:{address_id}"), &format!("address_media:{address_id}"))
            .await?;
        Ok(self.media_list(address_id))
    }

    async fn address_media_blob(&self, media_id: &str) -> Result<MediaStream, UpstreamError> {
        self.enter(format!("address_blob:{media_id}"), &format!("address_blob:{media_id}"))
            .await?;
        Ok(self.blob(media_id, format!("address-blob:{media_id}")))
    }
}

/// One entry written through [`RecordingUploader`].
#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    Folder,
    Json(Value),
    Binary { content_type: String, data: Bytes },
}

/// In-memory [`Uploader`] keyed by `/`-separated path.
#[derive(Default)]
pub struct RecordingUploader {
    entries: Mutex<BTreeMap<String, Stored>>,
}

impl RecordingUploader {
    /// Paths of every uploaded file (folders excluded), sorted.
    pub fn paths(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("entries lock")
            .iter()
            .filter(|(_, stored)| !matches!(stored, Stored::Folder))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn get(&self, path: &str) -> Option<Stored> {
        self.entries.lock().expect("entries lock").get(path).cloned()
    }

    fn insert(&self, folder: &FolderId, name: &str, stored: Stored) {
        let path = format!("{}/{}", folder.as_str(), sanitize_name(name));
        self.entries.lock().expect("entries lock").insert(path, stored);
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn create_folder(&self, parent: Option<&FolderId>, name: &str) -> upload::Result<FolderId> {
        let folder = FolderId::child(parent, &sanitize_name(name));
        self.entries
            .lock()
            .expect("entries lock")
            .insert(folder.as_str().to_string(), Stored::Folder);
        Ok(folder)
    }

    async fn upload_json(&self, folder: &FolderId, name: &str, document: &Value) -> upload::Result<()> {
        self.insert(folder, name, Stored::Json(document.clone()));
        Ok(())
    }

    async fn upload_binary(&self, folder: &FolderId, name: &str, content_type: &str, data: Bytes) -> upload::Result<()> {
        self.insert(
            folder,
            name,
            Stored::Binary {
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(())
    }
}
