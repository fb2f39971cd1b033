//! Downstream document store.
//!
//! The sync pipeline writes JSON documents and binary files into a folder
//! hierarchy through the [`Uploader`] trait. [`DirectoryUploader`] is a
//! local-directory store; other backends plug in behind the same trait.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, instrument};

/// Location of a folder inside the store, as `/`-separated sanitised names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderId(String);

impl FolderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn child(parent: Option<&FolderId>, name: &str) -> Self {
        match parent {
            Some(parent) => FolderId(format!("{}/{}", parent.0, name)),
            None => FolderId(name.to_string()),
        }
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("uploader used before prepare()")]
    NotPrepared,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize document {name}: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Create (or reuse) a folder under `parent`, or at the root when `parent` is `None`.
    async fn create_folder(&self, parent: Option<&FolderId>, name: &str) -> Result<FolderId>;

    async fn upload_json(&self, folder: &FolderId, name: &str, document: &Value) -> Result<()>;

    async fn upload_binary(&self, folder: &FolderId, name: &str, content_type: &str, data: Bytes) -> Result<()>;
}

/// Make a provider-supplied name safe to use as a single path component.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') || c.is_control() { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Document store backed by a local directory.
///
/// Construction is two-phase: [`DirectoryUploader::new`] only records the root,
/// [`DirectoryUploader::prepare`] creates it and must succeed before any upload.
#[derive(Debug)]
pub struct DirectoryUploader {
    root: PathBuf,
    prepared: AtomicBool,
}

impl DirectoryUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prepared: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|source| UploadError::Io {
            path: self.root.clone(),
            source,
        })?;
        self.prepared.store(true, Ordering::Release);
        debug!(root = %self.root.display(), "Document store ready");
        Ok(())
    }

    fn folder_path(&self, folder: &FolderId) -> Result<PathBuf> {
        if !self.prepared.load(Ordering::Acquire) {
            return Err(UploadError::NotPrepared);
        }
        Ok(folder.as_str().split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }

    async fn write(&self, folder: &FolderId, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.folder_path(folder)?.join(sanitize_name(name));
        tokio::fs::write(&path, contents)
            .await
            .map_err(|source| UploadError::Io { path: path.clone(), source })?;
        Ok(path)
    }
}

#[async_trait]
impl Uploader for DirectoryUploader {
    #[instrument(skip(self), err)]
    async fn create_folder(&self, parent: Option<&FolderId>, name: &str) -> Result<FolderId> {
        let folder = FolderId::child(parent, &sanitize_name(name));
        let path = self.folder_path(&folder)?;
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| UploadError::Io { path, source })?;
        Ok(folder)
    }

    #[instrument(skip(self, document), err)]
    async fn upload_json(&self, folder: &FolderId, name: &str, document: &Value) -> Result<()> {
        let contents = serde_json::to_vec_pretty(document).map_err(|source| UploadError::Serialize {
            name: name.to_string(),
            source,
        })?;
        self.write(folder, name, &contents).await?;
        Ok(())
    }

    #[instrument(skip(self, data), fields(bytes = data.len()), err)]
    async fn upload_binary(&self, folder: &FolderId, name: &str, content_type: &str, data: Bytes) -> Result<()> {
        let path = self.write(folder, name, &data).await?;
        debug!(path = %path.display(), content_type, "Stored binary file");
        Ok(())
    }
}
