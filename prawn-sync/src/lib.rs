//! prawn-sync: client-side state for a music download backend
//!
//! Three stores mirror what the backend owns: the download queue, an
//! activity log of outcomes, and the settings. Callers go through a
//! [`Session`]; state only moves when the backend has confirmed, either as a
//! command result or as a pushed event.
//!
//! ```ignore
//! let (backend, events) = LocalBackend::new(LocalBackendConfig::default());
//! let session = Session::start(backend, events).await?;
//!
//! session.enqueue(vec!["https://www.deezer.com/album/302127".into()])?;
//! let mut queue = session.queue();
//! queue.wait_for(|q| q.len() == 3).await?;
//!
//! session.shutdown().await;
//! ```

pub mod action;
pub mod backend;
pub mod command;
pub mod config;
pub mod effect;
pub mod event;
pub mod log;
pub mod logging;
pub mod model;
pub mod queue;
pub mod session;

pub use action::Action;
pub use backend::{LocalBackend, LocalBackendConfig};
pub use command::{CommandKind, Request};
pub use config::ConfigState;
pub use effect::Effect;
pub use event::{BackendEvent, EventKind};
pub use log::{LogEntry, LogState};
pub use model::{Config, Item, ItemRef, QueueId, QueueItem, QueueStatus, Source, YoutubeFormat};
pub use queue::QueueState;
pub use session::{Session, SessionError, Snapshot};
