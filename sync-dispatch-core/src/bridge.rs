//! Typed subscription to backend-pushed events
//!
//! The backend pushes `{ name, payload }` pairs. The bridge decodes each one
//! into the application's closed event type and hands it to every handler
//! registered for that event's kind.
//!
//! A single pump task owns the handler registry and consumes the source
//! stream, so:
//! - events of one kind reach handlers in the order the backend emitted them
//! - registering and removing handlers is ordered with delivery
//! - a handler that fails or panics is logged and skipped; the others still run
//!
//! # Example
//!
//! ```ignore
//! let bridge = EventBridge::<BackendEvent>::spawn(events);
//!
//! let unlisten = bridge
//!     .subscribe(EventKind::Finished, move |event| {
//!         action_tx
//!             .send(Action::Backend(event.clone()))
//!             .map_err(|_| HandlerError::new("runtime stopped"))
//!     })
//!     .await?;
//!
//! // Later: detach this handler only
//! unlisten.unlisten();
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Event as it arrives from the backend, before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub name: String,
    pub payload: Value,
}

impl RawEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// A closed set of backend events.
///
/// `decode` is total: anything the backend sends must map to some variant,
/// typically a dedicated "malformed" one, so a bad payload never takes the
/// pump down.
pub trait BridgeEvent: Send + Sync + 'static {
    /// Discriminant used to route events to handlers.
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn decode(raw: RawEvent) -> Self;

    fn kind(&self) -> Self::Kind;
}

/// Error returned by an event handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error returned when the bridge can no longer accept subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("event bridge is shut down")]
    Closed,
}

/// Boxed event handler.
pub type Handler<E> = Box<dyn FnMut(&E) -> Result<(), HandlerError> + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ListenerId(u64);

enum Control<E: BridgeEvent> {
    Listen {
        kind: E::Kind,
        handler: Handler<E>,
        ack: oneshot::Sender<ListenerId>,
    },
    Unlisten {
        kind: E::Kind,
        id: ListenerId,
    },
    Count {
        ack: oneshot::Sender<usize>,
    },
}

/// Detaches one handler from the bridge.
///
/// Dropping it without calling [`unlisten`](Self::unlisten) keeps the
/// handler registered until the bridge shuts down.
pub struct Unlisten {
    release: Box<dyn FnOnce() + Send>,
}

impl Unlisten {
    fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Box::new(release),
        }
    }

    /// Stop future deliveries to this handler. Backend work is not affected.
    pub fn unlisten(self) {
        (self.release)();
    }
}

impl fmt::Debug for Unlisten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unlisten").finish_non_exhaustive()
    }
}

/// Resolve every pending subscription, then detach each one.
///
/// Waits until all subscription futures have settled, so a handler whose
/// registration was still in flight when teardown began is detached too.
pub async fn unlisten_all<I, F>(pending: I)
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<Unlisten, BridgeError>>,
{
    for result in join_all(pending).await {
        match result {
            Ok(unlisten) => unlisten.unlisten(),
            Err(err) => debug!(error = %err, "Subscription never completed"),
        }
    }
}

/// Handle to a running event pump.
pub struct EventBridge<E: BridgeEvent> {
    control_tx: mpsc::UnboundedSender<Control<E>>,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl<E: BridgeEvent> EventBridge<E> {
    /// Start pumping `source` into registered handlers.
    pub fn spawn<S>(source: S) -> Self
    where
        S: Stream<Item = RawEvent> + Send + 'static,
    {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let pump = tokio::spawn(pump::<E, S>(source, control_rx, cancel.clone()));

        Self {
            control_tx,
            cancel,
            pump: Some(pump),
        }
    }

    /// Register `handler` for every event of `kind`.
    ///
    /// Registration is queued immediately; the returned future resolves once
    /// the pump has installed the handler. From then on the handler sees
    /// every event the pump delivers.
    pub fn subscribe<F>(
        &self,
        kind: E::Kind,
        handler: F,
    ) -> impl Future<Output = Result<Unlisten, BridgeError>> + Send + 'static
    where
        F: FnMut(&E) -> Result<(), HandlerError> + Send + 'static,
    {
        let control_tx = self.control_tx.clone();
        let (ack_tx, ack_rx) = oneshot::channel();
        let queued = control_tx
            .send(Control::Listen {
                kind,
                handler: Box::new(handler),
                ack: ack_tx,
            })
            .is_ok();

        async move {
            if !queued {
                return Err(BridgeError::Closed);
            }
            let id = ack_rx.await.map_err(|_| BridgeError::Closed)?;
            Ok(Unlisten::new(move || {
                let _ = control_tx.send(Control::Unlisten { kind, id });
            }))
        }
    }

    /// Number of handlers currently registered, across all kinds.
    pub async fn listener_count(&self) -> Result<usize, BridgeError> {
        let (ack, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Count { ack })
            .map_err(|_| BridgeError::Closed)?;
        rx.await.map_err(|_| BridgeError::Closed)
    }

    /// Stop the pump and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(pump) = self.pump.take() {
            if let Err(err) = pump.await {
                warn!(error = %err, "Event pump ended abnormally");
            }
        }
    }
}

impl<E: BridgeEvent> Drop for EventBridge<E> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Registry<E: BridgeEvent> {
    next_id: u64,
    listeners: HashMap<E::Kind, Vec<(ListenerId, Handler<E>)>>,
}

impl<E: BridgeEvent> Registry<E> {
    fn new() -> Self {
        Self {
            next_id: 0,
            listeners: HashMap::new(),
        }
    }

    fn apply(&mut self, control: Control<E>) {
        match control {
            Control::Listen { kind, handler, ack } => {
                self.next_id += 1;
                let id = ListenerId(self.next_id);
                self.listeners.entry(kind).or_default().push((id, handler));
                // Subscriber dropped its future: nobody could ever unlisten
                if ack.send(id).is_err() {
                    debug!(?kind, "Subscriber gone before registration, removing handler");
                    self.remove(kind, id);
                }
            }
            Control::Unlisten { kind, id } => self.remove(kind, id),
            Control::Count { ack } => {
                let _ = ack.send(self.listeners.values().map(Vec::len).sum());
            }
        }
    }

    fn remove(&mut self, kind: E::Kind, id: ListenerId) {
        if let Some(handlers) = self.listeners.get_mut(&kind) {
            handlers.retain(|(listener, _)| *listener != id);
            if handlers.is_empty() {
                self.listeners.remove(&kind);
            }
        }
    }

    fn deliver(&mut self, event: E) {
        let kind = event.kind();
        let Some(handlers) = self.listeners.get_mut(&kind) else {
            debug!(?kind, "No listeners for event");
            return;
        };

        for (id, handler) in handlers.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(?kind, listener = id.0, error = %err, "Event handler failed")
                }
                Err(_) => warn!(?kind, listener = id.0, "Event handler panicked"),
            }
        }
    }
}

async fn pump<E, S>(
    source: S,
    mut control_rx: mpsc::UnboundedReceiver<Control<E>>,
    cancel: CancellationToken,
) where
    E: BridgeEvent,
    S: Stream<Item = RawEvent> + Send + 'static,
{
    tokio::pin!(source);
    let mut registry = Registry::<E>::new();
    let mut source_open = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Event bridge cancelled");
                break;
            }
            control = control_rx.recv() => match control {
                Some(control) => registry.apply(control),
                None => {
                    debug!("All bridge handles dropped, stopping pump");
                    break;
                }
            },
            raw = source.next(), if source_open => match raw {
                Some(raw) => registry.deliver(E::decode(raw)),
                None => {
                    debug!("Event source closed");
                    source_open = false;
                }
            },
        }
    }
}
