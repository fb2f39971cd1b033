//! Pulls a session (or address) from the provider and writes it to the document store.
//!
//! ```text
//! sync_session(id)
//!   ├─ aggregate_session()                  // first wave, 7 concurrent calls
//!   ├─ all failed?        → NothingFound
//!   ├─ no person name?    → MissingIdentity, nothing uploaded
//!   ├─ "{name} ({id})/"   ← one JSON document per record field (null if failed)
//!   └─ for each attempt:
//!        ├─ "attempts/{attempt}/media.json"
//!        └─ blobs, fetched concurrently, one file each
//! ```
//!
//! A blob that cannot be fetched or stored is skipped and counted; it does not
//! abort the rest of the session.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use metrics::counter;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::aggregate::{aggregate_session, fetch_attempt_media};
use crate::upload::{FolderId, UploadError, Uploader};
use crate::upstream::{MediaItem, MediaList, UpstreamError, VerificationApi};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Every upstream call for the session failed
    #[error("no data found for session {session_id}")]
    NothingFound { session_id: String },

    /// The person's name is required to file the session
    #[error("session {session_id} has no resolvable person name, refusing to upload partial identity data")]
    MissingIdentity { session_id: String },

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl SyncError {
    fn kind(&self) -> &'static str {
        match self {
            SyncError::NothingFound { .. } => "nothing_found",
            SyncError::MissingIdentity { .. } => "missing_identity",
            SyncError::Upload(_) => "upload_error",
            SyncError::Upstream(_) => "upstream_error",
        }
    }
}

/// What a sync wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Root folder of the session or address
    pub folder: Option<FolderId>,
    pub documents: usize,
    pub files: usize,
    /// Blobs that could not be fetched or stored
    pub skipped: usize,
}

/// File name for a media blob: `{context}-{id}[.{ext}]`.
///
/// The extension comes from the listed MIME type, falling back to the response's
/// content type.
pub fn media_file_name(item: &MediaItem, content_type: &str) -> String {
    let extension = [item.mime_type.as_str(), content_type]
        .into_iter()
        .find_map(extension_for);

    let stem = if item.context.is_empty() {
        item.id.clone()
    } else {
        format!("{}-{}", item.context, item.id)
    };

    match extension {
        Some(extension) => format!("{stem}.{extension}"),
        None => stem,
    }
}

fn extension_for(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type.split(';').next()?.trim();
    let extensions = mime_guess::get_mime_extensions_str(essence)?;
    let subtype = essence.split('/').nth(1)?;
    // Prefer the extension spelled like the subtype (jpeg over jfif)
    extensions
        .iter()
        .find(|extension| extension.eq_ignore_ascii_case(subtype))
        .or_else(|| extensions.first())
        .copied()
}

pub struct SessionSync {
    api: Arc<dyn VerificationApi>,
    uploader: Arc<dyn Uploader>,
    registry_version: String,
}

impl SessionSync {
    pub fn new(api: Arc<dyn VerificationApi>, uploader: Arc<dyn Uploader>, registry_version: impl Into<String>) -> Self {
        Self {
            api,
            uploader,
            registry_version: registry_version.into(),
        }
    }

    /// Sync everything the provider holds for a verification session.
    #[instrument(skip(self))]
    pub async fn sync_session(&self, session_id: &str) -> Result<SyncReport, SyncError> {
        let result = self.try_sync_session(session_id).await;
        record_outcome("session", &result);
        result
    }

    async fn try_sync_session(&self, session_id: &str) -> Result<SyncReport, SyncError> {
        let record = aggregate_session(self.api.as_ref(), session_id, &self.registry_version).await;

        if record.all_failed() {
            return Err(SyncError::NothingFound {
                session_id: session_id.to_string(),
            });
        }

        let Some(name) = record.person.value().and_then(|info| info.person.full_name()) else {
            return Err(SyncError::MissingIdentity {
                session_id: session_id.to_string(),
            });
        };

        let folder = self.uploader.create_folder(None, &format!("{name} ({session_id})")).await?;
        let mut report = SyncReport {
            folder: Some(folder.clone()),
            ..Default::default()
        };

        for (field, document) in record.documents() {
            self.uploader.upload_json(&folder, &format!("{field}.json"), &document).await?;
            report.documents += 1;
        }

        let attempts = record.attempt_list();
        if !attempts.is_empty() {
            let attempts_folder = self.uploader.create_folder(Some(&folder), "attempts").await?;

            for attempt_media in fetch_attempt_media(self.api.as_ref(), attempts).await {
                let attempt_folder = self
                    .uploader
                    .create_folder(Some(&attempts_folder), &attempt_media.attempt.id)
                    .await?;
                self.uploader
                    .upload_json(&attempt_folder, "media.json", &attempt_media.media.document())
                    .await?;
                report.documents += 1;

                match attempt_media.media.value() {
                    Some(media) => self.store_blobs(&attempt_folder, media, BlobSource::Attempt, &mut report).await,
                    None => warn!(attempt_id = %attempt_media.attempt.id, "Attempt media unavailable, skipping blobs"),
                }
            }
        }

        info!(
            documents = report.documents,
            files = report.files,
            skipped = report.skipped,
            "Session synced"
        );
        Ok(report)
    }

    /// Sync the media attached to an address verification.
    #[instrument(skip(self))]
    pub async fn sync_address(&self, address_id: &str) -> Result<SyncReport, SyncError> {
        let result = self.try_sync_address(address_id).await;
        record_outcome("address", &result);
        result
    }

    async fn try_sync_address(&self, address_id: &str) -> Result<SyncReport, SyncError> {
        let media = self.api.address_media(address_id).await?;

        let folder = self.uploader.create_folder(None, &format!("address ({address_id})")).await?;
        let mut report = SyncReport {
            folder: Some(folder.clone()),
            ..Default::default()
        };

        let document = serde_json::to_value(&media).unwrap_or(Value::Null);
        self.uploader.upload_json(&folder, "media.json", &document).await?;
        report.documents += 1;

        self.store_blobs(&folder, &media, BlobSource::Address, &mut report).await;

        info!(files = report.files, skipped = report.skipped, "Address synced");
        Ok(report)
    }

    /// Fetch every blob in a listing concurrently, then store them one by one.
    async fn store_blobs(&self, folder: &FolderId, media: &MediaList, source: BlobSource, report: &mut SyncReport) {
        let items: Vec<&MediaItem> = media.items().collect();
        let blobs = join_all(items.iter().map(|item| self.fetch_blob(source, &item.id))).await;

        for (item, blob) in items.into_iter().zip(blobs) {
            let (content_type, data) = match blob {
                Ok(blob) => blob,
                Err(e) => {
                    warn!(media_id = %item.id, error = %e, "Failed to fetch media, skipping");
                    report.skipped += 1;
                    continue;
                }
            };

            let name = media_file_name(item, &content_type);
            match self.uploader.upload_binary(folder, &name, &content_type, data).await {
                Ok(()) => report.files += 1,
                Err(e) => {
                    warn!(media_id = %item.id, error = %e, "Failed to store media, skipping");
                    report.skipped += 1;
                }
            }
        }
    }

    async fn fetch_blob(&self, source: BlobSource, media_id: &str) -> Result<(String, Bytes), UpstreamError> {
        let stream = match source {
            BlobSource::Attempt => self.api.media(media_id).await?,
            BlobSource::Address => self.api.address_media_blob(media_id).await?,
        };
        let content_type = stream.content_type.clone();
        Ok((content_type, stream.collect().await?))
    }
}

#[derive(Debug, Clone, Copy)]
enum BlobSource {
    Attempt,
    Address,
}

fn record_outcome(kind: &'static str, result: &Result<SyncReport, SyncError>) {
    let outcome = match result {
        Ok(_) => "synced",
        Err(e) => {
            warn!(kind, error = %e, "Sync did not complete");
            e.kind()
        }
    };
    counter!("idsync_sessions_synced_total", "kind" => kind, "outcome" => outcome).increment(1);
}
