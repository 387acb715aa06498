//! Data exchanged with the download backend

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend-assigned identity of a queue entry.
pub type QueueId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Youtube,
    Deezer,
}

/// A downloadable track, as resolved from a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Provider-side id (Deezer track id, YouTube video id).
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub url: String,
}

impl Item {
    /// `artist - title`, as it appears in log lines.
    pub fn label(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Inactive,
    Downloading,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

impl QueueStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, QueueStatus::Error { .. })
    }
}

/// One entry of the download queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueId,
    pub item: Item,
    #[serde(default)]
    pub status: QueueStatus,
}

impl QueueItem {
    pub fn new(id: QueueId, item: Item) -> Self {
        Self {
            id,
            item,
            status: QueueStatus::Inactive,
        }
    }
}

/// How a per-item event names its item.
///
/// The backend is not consistent: depending on the event it sends the queue
/// id, the provider-side item id as a string, or the whole item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemRef {
    Queue(QueueId),
    Key(String),
    Item(Item),
}

impl ItemRef {
    /// Position of the referenced entry in `items`.
    ///
    /// A string key is matched against item ids first, then against queue ids.
    pub fn locate(&self, items: &[QueueItem]) -> Option<usize> {
        match self {
            ItemRef::Queue(id) => items.iter().position(|entry| entry.id == *id),
            ItemRef::Key(key) => items
                .iter()
                .position(|entry| entry.item.id == *key)
                .or_else(|| items.iter().position(|entry| entry.id.to_string() == *key)),
            ItemRef::Item(item) => items.iter().position(|entry| entry.item.id == item.id),
        }
    }

    /// The full item, when the payload carried one.
    pub fn item(&self) -> Option<&Item> {
        match self {
            ItemRef::Item(item) => Some(item),
            _ => None,
        }
    }

    /// Best available description when the item is not in the queue.
    pub fn describe(&self) -> String {
        match self {
            ItemRef::Queue(id) => id.to_string(),
            ItemRef::Key(key) => key.clone(),
            ItemRef::Item(item) => item.label(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YoutubeFormat {
    #[default]
    Mp3,
    Webm,
    Wav,
    Ogg,
}

/// Process-wide settings owned by the backend.
///
/// Keys this crate does not know about are kept in `extra` and sent back
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub youtube_format: YoutubeFormat,
    #[serde(default)]
    pub split_by_chapters_default: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
