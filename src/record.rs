//! Record / Snapshot data model.
//!
//! A Snapshot is the `entries` array of one provider document, in the
//! provider's native order (most recent first). Identity is `id` only; every
//! other field is payload and is written back out unchanged.

use serde::{Deserialize, Serialize};

use crate::errors::DriverError;

/// One history entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fulltitle: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub alt_title: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub dislike_count: Option<u64>,
    #[serde(default)]
    pub average_rating: Option<f64>,
}

impl Record {
    /// Record carrying only an identifier (and a title equal to it).
    pub fn with_id<S: Into<String>>(id: S) -> Self {
        let id = id.into();
        Self {
            title: Some(id.clone()),
            id,
            fulltitle: None,
            alt_title: None,
            track: None,
            description: None,
            tags: None,
            view_count: None,
            dislike_count: None,
            average_rating: None,
        }
    }

    /// Best human label: fulltitle, then title, then id.
    pub fn label(&self) -> &str {
        self.fulltitle
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or(&self.id)
    }

    /// Serialized payload for the downstream store.
    pub fn to_payload(&self) -> Result<Vec<u8>, DriverError> {
        serde_json::to_vec(self).map_err(|e| DriverError::Publish(format!("serialize {}: {}", self.id, e)))
    }
}

/// Ordered result of one fetch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub entries: Vec<Record>,
}

impl Snapshot {
    pub fn new(entries: Vec<Record>) -> Self {
        Self { entries }
    }

    /// Decode a provider document (`{"entries": [...], ...}`); unknown keys are ignored.
    pub fn from_json(bytes: &[u8]) -> Result<Self, DriverError> {
        let snap: Snapshot = serde_json::from_slice(bytes)?;
        Ok(snap)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|r| r.id.as_str()).collect()
    }
}

impl From<Vec<Record>> for Snapshot {
    fn from(entries: Vec<Record>) -> Self {
        Snapshot::new(entries)
    }
}
