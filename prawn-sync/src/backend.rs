//! In-process download backend
//!
//! Answers every command the real backend understands and pushes the same
//! events, but resolves URLs offline and fakes downloads with a timer. Used
//! by the demo binary and the integration tests.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use sync_dispatch::{RawEvent, Transport, TransportError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};
use url::Url;

use crate::command::{
    AddToQueue, CommandKind, GetItem, GetSongs, RemoveFromQueue, RequestDownload, UpdateConfig,
};
use crate::model::{Config, Item, QueueId, QueueItem, QueueStatus, Source};

/// Provider ids at or above this are treated as missing upstream.
const MISSING_FROM: u64 = 900_000_000;

/// Tracks per resolved album.
const ALBUM_TRACKS: u64 = 3;

#[derive(Debug, Clone)]
pub struct LocalBackendConfig {
    /// How long a simulated download takes.
    pub settle: Duration,
    /// Fail every n-th download. `None` never fails.
    pub fail_every: Option<u32>,
    /// Initial settings.
    pub config: Config,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(50),
            fail_every: None,
            config: Config::default(),
        }
    }
}

struct Shared {
    queue: Mutex<Vec<QueueItem>>,
    config: Mutex<Config>,
    next_id: AtomicU64,
    downloads: AtomicU32,
    events: mpsc::UnboundedSender<RawEvent>,
    settle: Duration,
    fail_every: Option<u32>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn emit(&self, name: &str, payload: Value) {
        if self.events.send(RawEvent::new(name, payload)).is_err() {
            debug!(event = name, "No event listener, dropping");
        }
    }

    fn publish_queue(&self, queue: &[QueueItem]) {
        match serde_json::to_value(queue) {
            Ok(payload) => self.emit("queue_update", payload),
            Err(err) => debug!(error = %err, "Could not encode queue snapshot"),
        }
    }

    fn next_id(&self) -> QueueId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Count a finished download; true when this one should fail.
    fn roll_failure(&self) -> bool {
        let n = self.downloads.fetch_add(1, Ordering::Relaxed) + 1;
        matches!(self.fail_every, Some(every) if every > 0 && n % every == 0)
    }
}

/// Simulated backend. Clones share the same queue.
#[derive(Clone)]
pub struct LocalBackend {
    shared: Arc<Shared>,
}

impl LocalBackend {
    /// Create the backend and the event stream it pushes into.
    pub fn new(settings: LocalBackendConfig) -> (Self, UnboundedReceiverStream<RawEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Shared {
            queue: Mutex::new(Vec::new()),
            config: Mutex::new(settings.config),
            next_id: AtomicU64::new(1),
            downloads: AtomicU32::new(0),
            events,
            settle: settings.settle,
            fail_every: settings.fail_every,
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            UnboundedReceiverStream::new(rx),
        )
    }

    /// Current queue contents.
    pub fn queue(&self) -> Vec<QueueItem> {
        lock(&self.shared.queue).clone()
    }

    /// Push an arbitrary event, as a misbehaving backend might.
    pub fn emit_raw(&self, name: &str, payload: Value) {
        self.shared.emit(name, payload);
    }

    fn add_to_queue(&self, urls: Vec<String>) -> Result<Vec<QueueItem>, TransportError> {
        let mut resolved = Vec::new();
        for url in &urls {
            resolved.extend(self.resolve(url)?);
        }

        let entries: Vec<QueueItem> = resolved
            .into_iter()
            .map(|item| QueueItem::new(self.shared.next_id(), item))
            .collect();

        let mut queue = lock(&self.shared.queue);
        queue.extend(entries.iter().cloned());
        self.shared.publish_queue(&queue);
        info!(added = entries.len(), total = queue.len(), "Queued");

        Ok(entries)
    }

    fn remove(&self, id: QueueId) {
        let mut queue = lock(&self.shared.queue);
        let before = queue.len();
        queue.retain(|entry| entry.id != id);
        if queue.len() != before {
            self.shared.publish_queue(&queue);
        }
    }

    fn clear(&self) {
        let mut queue = lock(&self.shared.queue);
        queue.clear();
        self.shared.publish_queue(&queue);
    }

    fn request_download(&self, id: QueueId) -> Result<(), TransportError> {
        let mut queue = lock(&self.shared.queue);
        let entry = queue
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| TransportError::Rejected(format!("no queue entry {}", id)))?;
        entry.status = QueueStatus::Downloading;
        self.shared.publish_queue(&queue);
        drop(queue);

        self.spawn_download(id);
        Ok(())
    }

    fn download_all(&self) {
        let mut queue = lock(&self.shared.queue);
        let ids: Vec<QueueId> = queue
            .iter_mut()
            .filter(|entry| entry.status == QueueStatus::Inactive)
            .map(|entry| {
                entry.status = QueueStatus::Downloading;
                entry.id
            })
            .collect();
        self.shared.publish_queue(&queue);
        drop(queue);

        for id in ids {
            self.spawn_download(id);
        }
    }

    fn spawn_download(&self, id: QueueId) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.emit("start", json!(id));
            tokio::time::sleep(shared.settle).await;

            let failed = shared.roll_failure();
            let mut queue = lock(&shared.queue);
            let Some(index) = queue.iter().position(|entry| entry.id == id) else {
                debug!(id, "Download target removed before it finished");
                return;
            };

            if failed {
                let message = "simulated failure".to_string();
                queue[index].status = QueueStatus::Error {
                    message: Some(message.clone()),
                };
                shared.emit("download_error", json!({ "item": id, "message": message }));
            } else {
                let entry = queue.remove(index);
                shared.emit("finish", json!(entry.item.id));
            }
            shared.publish_queue(&queue);
        });
    }

    /// Resolve a URL into the items it names.
    ///
    /// Ids the provider does not know produce a not-found event and no items.
    fn resolve(&self, raw: &str) -> Result<Vec<Item>, TransportError> {
        let unsupported = || TransportError::Rejected(format!("unsupported url: {}", raw));
        let url = Url::parse(raw).map_err(|_| unsupported())?;
        let host = url.host_str().unwrap_or_default();

        if host.ends_with("deezer.com") {
            let segments: Vec<&str> = url.path_segments().map(Iterator::collect).unwrap_or_default();
            let (kind, id) = segments
                .windows(2)
                .find_map(|pair| match (pair[0], pair[1].parse::<u64>()) {
                    (kind @ ("track" | "album"), Ok(id)) => Some((kind, id)),
                    _ => None,
                })
                .ok_or_else(unsupported)?;

            if id >= MISSING_FROM {
                let event = if kind == "track" {
                    "song_not_found"
                } else {
                    "album_not_found"
                };
                self.shared.emit(event, json!(id));
                return Ok(Vec::new());
            }

            return Ok(if kind == "track" {
                vec![deezer_track(id, None, raw)]
            } else {
                (1..=ALBUM_TRACKS)
                    .map(|n| deezer_track(id * 100 + n, Some(id), raw))
                    .collect()
            });
        }

        let video = if host.ends_with("youtube.com") {
            url.query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned())
        } else if host == "youtu.be" {
            url.path_segments()
                .and_then(|mut segments| segments.next())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
        } else {
            None
        };

        video
            .map(|id| {
                vec![Item {
                    title: format!("Video {}", id),
                    id,
                    artist: "YouTube".into(),
                    album: None,
                    source: Source::Youtube,
                    url: raw.to_string(),
                }]
            })
            .ok_or_else(unsupported)
    }
}

fn deezer_track(id: u64, album: Option<u64>, url: &str) -> Item {
    Item {
        id: id.to_string(),
        title: format!("Track {}", id),
        artist: "Deezer Artist".into(),
        album: album.map(|album| format!("Album {}", album)),
        source: Source::Deezer,
        url: url.to_string(),
    }
}

fn args<T: DeserializeOwned>(command: &str, args: Value) -> Result<T, TransportError> {
    serde_json::from_value(args)
        .map_err(|err| TransportError::Rejected(format!("bad arguments for {}: {}", command, err)))
}

fn reply<T: Serialize>(value: T) -> Result<Value, TransportError> {
    serde_json::to_value(value).map_err(|err| TransportError::Rejected(err.to_string()))
}

#[async_trait]
impl Transport for LocalBackend {
    async fn invoke(&self, command: &'static str, payload: Value) -> Result<Value, TransportError> {
        let kind = CommandKind::from_name(command)
            .ok_or_else(|| TransportError::Rejected(format!("unknown command {}", command)))?;
        debug!(command, "Backend received command");

        match kind {
            CommandKind::GetConfig => {
                let config = lock(&self.shared.config).clone();
                reply(config)
            }
            CommandKind::UpdateConfig => {
                let UpdateConfig { config } = args(command, payload)?;
                *lock(&self.shared.config) = config.clone();
                reply(config)
            }
            CommandKind::AddToQueue => {
                let AddToQueue { urls } = args(command, payload)?;
                reply(self.add_to_queue(urls)?)
            }
            CommandKind::RemoveFromQueue => {
                let RemoveFromQueue { id } = args(command, payload)?;
                self.remove(id);
                Ok(Value::Null)
            }
            CommandKind::RequestDownload => {
                let RequestDownload { id } = args(command, payload)?;
                self.request_download(id)?;
                Ok(Value::Null)
            }
            CommandKind::DownloadQueue => {
                self.download_all();
                Ok(Value::Null)
            }
            CommandKind::ClearQueue => {
                self.clear();
                Ok(Value::Null)
            }
            CommandKind::GetItem => {
                let GetItem { url } = args(command, payload)?;
                let item = self
                    .resolve(&url)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| TransportError::Rejected(format!("nothing found at {}", url)))?;
                reply(item)
            }
            CommandKind::GetSongs => {
                let GetSongs { url } = args(command, payload)?;
                reply(self.resolve(&url)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn backend() -> (LocalBackend, UnboundedReceiverStream<RawEvent>) {
        LocalBackend::new(LocalBackendConfig {
            settle: Duration::from_millis(5),
            ..LocalBackendConfig::default()
        })
    }

    async fn next(events: &mut UnboundedReceiverStream<RawEvent>) -> RawEvent {
        tokio::time::timeout(Duration::from_millis(500), events.next())
            .await
            .expect("timeout")
            .expect("stream closed")
    }

    #[test]
    fn test_resolves_known_providers() {
        let (backend, _events) = backend();

        let track = backend.resolve("https://www.deezer.com/en/track/3135556").unwrap();
        assert_eq!(track[0].id, "3135556");
        assert_eq!(track[0].source, Source::Deezer);

        let album = backend.resolve("https://www.deezer.com/album/302127").unwrap();
        assert_eq!(album.len(), 3);
        assert_eq!(album[0].album.as_deref(), Some("Album 302127"));

        let video = backend.resolve("https://www.youtube.com/watch?v=FGBhQbmPwH8").unwrap();
        assert_eq!(video[0].id, "FGBhQbmPwH8");
        assert_eq!(backend.resolve("https://youtu.be/abc").unwrap()[0].id, "abc");

        assert!(backend.resolve("https://example.com/track/1").is_err());
        assert!(backend.resolve("not a url").is_err());
    }

    #[tokio::test]
    async fn test_missing_track_emits_not_found() {
        let (backend, mut events) = backend();

        let items = backend.resolve("https://www.deezer.com/track/900000001").unwrap();

        assert!(items.is_empty());
        let event = next(&mut events).await;
        assert_eq!(event.name, "song_not_found");
        assert_eq!(event.payload, json!(900000001u64));
    }

    #[tokio::test]
    async fn test_add_assigns_ids_and_publishes() {
        let (backend, mut events) = backend();

        let reply = backend
            .invoke(
                "add_to_queue",
                json!({ "urls": ["https://www.deezer.com/album/7"] }),
            )
            .await
            .unwrap();
        let entries: Vec<QueueItem> = serde_json::from_value(reply).unwrap();

        assert_eq!(entries.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        let event = next(&mut events).await;
        assert_eq!(event.name, "queue_update");
        assert_eq!(event.payload.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_download_finishes_and_leaves_queue() {
        let (backend, mut events) = backend();
        backend
            .invoke("add_to_queue", json!({ "urls": ["https://youtu.be/abc"] }))
            .await
            .unwrap();
        backend.invoke("request_download", json!({ "id": 1 })).await.unwrap();

        let mut names = Vec::new();
        while names.last().map(String::as_str) != Some("finish") {
            names.push(next(&mut events).await.name);
        }

        assert_eq!(names, vec!["queue_update", "queue_update", "start", "finish"]);
        assert_eq!(next(&mut events).await.name, "queue_update");
        assert!(backend.queue().is_empty());
    }

    #[tokio::test]
    async fn test_every_nth_download_fails() {
        let (backend, mut events) = LocalBackend::new(LocalBackendConfig {
            settle: Duration::from_millis(1),
            fail_every: Some(1),
            ..LocalBackendConfig::default()
        });
        backend
            .invoke("add_to_queue", json!({ "urls": ["https://youtu.be/abc"] }))
            .await
            .unwrap();
        backend.invoke("download_queue", json!({})).await.unwrap();

        let error = loop {
            let event = next(&mut events).await;
            if event.name == "download_error" {
                break event;
            }
        };

        assert_eq!(error.payload, json!({ "item": 1, "message": "simulated failure" }));
        assert!(backend.queue()[0].status.is_error());
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let (backend, _events) = backend();

        assert_eq!(
            backend.invoke("remove_from_queue", json!({ "id": 99 })).await,
            Ok(Value::Null)
        );
        assert!(matches!(
            backend.invoke("request_download", json!({ "id": 99 })).await,
            Err(TransportError::Rejected(_))
        ));
        assert!(matches!(
            backend.invoke("format_disk", json!({})).await,
            Err(TransportError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_update_config_echoes_stored_value() {
        let (backend, _events) = backend();
        let mut config = Config::default();
        config.split_by_chapters_default = true;

        let stored = backend
            .invoke("update_config", json!({ "config": config }))
            .await
            .unwrap();

        assert_eq!(stored["splitByChaptersDefault"], json!(true));
        assert_eq!(backend.invoke("get_config", json!({})).await.unwrap(), stored);
    }
}
