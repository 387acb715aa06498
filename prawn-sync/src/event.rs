//! The closed set of backend events

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sync_dispatch::{BridgeEvent, RawEvent};

use crate::model::{ItemRef, QueueItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    QueueUpdate,
    Started,
    Finished,
    DownloadError,
    SongNotFound,
    AlbumNotFound,
    Malformed,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::QueueUpdate,
        EventKind::Started,
        EventKind::Finished,
        EventKind::DownloadError,
        EventKind::SongNotFound,
        EventKind::AlbumNotFound,
        EventKind::Malformed,
    ];
}

/// A decoded backend event.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Full queue, in backend order.
    QueueUpdate(Vec<QueueItem>),
    Started(ItemRef),
    Finished(ItemRef),
    DownloadError {
        target: ItemRef,
        message: Option<String>,
    },
    SongNotFound(u64),
    AlbumNotFound(u64),
    /// Unknown name or a payload of the wrong shape.
    Malformed { name: String, detail: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DownloadErrorPayload {
    Detailed {
        item: ItemRef,
        #[serde(default)]
        message: Option<String>,
    },
    Bare(ItemRef),
}

impl From<DownloadErrorPayload> for BackendEvent {
    fn from(payload: DownloadErrorPayload) -> Self {
        let (target, message) = match payload {
            DownloadErrorPayload::Detailed { item, message } => (item, message),
            DownloadErrorPayload::Bare(item) => (item, None),
        };
        BackendEvent::DownloadError { target, message }
    }
}

fn parse<T: DeserializeOwned>(
    payload: Value,
    wrap: impl FnOnce(T) -> BackendEvent,
) -> Result<BackendEvent, String> {
    serde_json::from_value(payload)
        .map(wrap)
        .map_err(|e| e.to_string())
}

impl BridgeEvent for BackendEvent {
    type Kind = EventKind;

    fn decode(raw: RawEvent) -> Self {
        let RawEvent { name, payload } = raw;

        let decoded = match name.as_str() {
            "queue_update" => parse(payload, BackendEvent::QueueUpdate),
            "start" | "download_started" => parse(payload, BackendEvent::Started),
            "finish" | "download_complete" => parse(payload, BackendEvent::Finished),
            "download_error" => parse(payload, |p: DownloadErrorPayload| p.into()),
            "song_not_found" => parse(payload, BackendEvent::SongNotFound),
            "album_not_found" => parse(payload, BackendEvent::AlbumNotFound),
            _ => Err("unknown event".to_string()),
        };

        decoded.unwrap_or_else(|detail| BackendEvent::Malformed { name, detail })
    }

    fn kind(&self) -> EventKind {
        match self {
            BackendEvent::QueueUpdate(_) => EventKind::QueueUpdate,
            BackendEvent::Started(_) => EventKind::Started,
            BackendEvent::Finished(_) => EventKind::Finished,
            BackendEvent::DownloadError { .. } => EventKind::DownloadError,
            BackendEvent::SongNotFound(_) => EventKind::SongNotFound,
            BackendEvent::AlbumNotFound(_) => EventKind::AlbumNotFound,
            BackendEvent::Malformed { .. } => EventKind::Malformed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(name: &str, payload: Value) -> BackendEvent {
        BackendEvent::decode(RawEvent::new(name, payload))
    }

    #[test]
    fn test_aliases_decode_to_same_event() {
        assert_eq!(decode("start", json!(2)), decode("download_started", json!(2)));
        assert_eq!(
            decode("finish", json!("abc")),
            BackendEvent::Finished(ItemRef::Key("abc".into()))
        );
        assert_eq!(decode("download_complete", json!(5)).kind(), EventKind::Finished);
    }

    #[test]
    fn test_download_error_payload_shapes() {
        assert_eq!(
            decode("download_error", json!({ "item": 4, "message": "HTTP 403" })),
            BackendEvent::DownloadError {
                target: ItemRef::Queue(4),
                message: Some("HTTP 403".into())
            }
        );
        assert_eq!(
            decode("download_error", json!(4)),
            BackendEvent::DownloadError {
                target: ItemRef::Queue(4),
                message: None
            }
        );
    }

    #[test]
    fn test_bad_payload_becomes_malformed() {
        let event = decode("song_not_found", json!("nope"));

        assert!(matches!(
            &event,
            BackendEvent::Malformed { name, .. } if name == "song_not_found"
        ));
        assert_eq!(event.kind(), EventKind::Malformed);
    }

    #[test]
    fn test_unknown_name_becomes_malformed() {
        assert_eq!(
            decode("parse_error", json!("x")),
            BackendEvent::Malformed {
                name: "parse_error".into(),
                detail: "unknown event".into()
            }
        );
    }
}
