//! Response bodies returned by the verification provider.
//!
//! Only the fields this service reads are typed. Everything else is kept in a
//! flattened map so documents can be uploaded without losing provider data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `GET sessions/{id}/decision`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub status: String,
    /// Absent until the provider has reached a decision.
    pub verification: Option<Verification>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `GET sessions/{id}/person`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonInfo {
    pub status: String,
    #[serde(default)]
    pub person: Person,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Person {
    /// "First Last", or `None` unless both names are present and non-blank.
    pub fn full_name(&self) -> Option<String> {
        let first = self.first_name.as_deref().map(str::trim).filter(|name| !name.is_empty())?;
        let last = self.last_name.as_deref().map(str::trim).filter(|name| !name.is_empty())?;
        Some(format!("{first} {last}"))
    }
}

/// One binary asset. The payload itself is fetched separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "duration")]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "size")]
    pub size_bytes: u64,
    #[serde(default, rename = "mimetype")]
    pub mime_type: String,
}

/// Media listing for a session, attempt or address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaList {
    pub status: String,
    #[serde(default)]
    pub videos: Vec<MediaItem>,
    #[serde(default)]
    pub images: Vec<MediaItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MediaList {
    /// Videos first, then images.
    pub fn items(&self) -> impl Iterator<Item = &MediaItem> {
        self.videos.iter().chain(self.images.iter())
    }

    pub fn len(&self) -> usize {
        self.videos.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One submission of evidence within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `GET sessions/{id}/attempts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptList {
    pub status: String,
    #[serde(default)]
    pub verifications: Vec<Attempt>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
