//! Session: the three stores, the action loop and the bridge, wired together
//!
//! A session is created once with [`Session::start`] and torn down once with
//! [`Session::shutdown`]. Everything in between goes through
//! [`Session::dispatch`] and the watch receivers it hands out.

use futures::future::join_all;
use sync_dispatch::{
    unlisten_all, BridgeError, CommandGateway, DispatchResult, EffectContext, EffectRuntime,
    EffectStore, EffectStoreLike, EventBridge, GatewayError, HandlerError, LoggingMiddleware,
    RawEvent, Store, Transport, Unlisten,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::action::Action;
use crate::command::{GetConfig, GetItem, GetSongs};
use crate::config::{self, ConfigState};
use crate::effect::Effect;
use crate::event::{BackendEvent, EventKind};
use crate::log::{self, LogState};
use crate::model::{Config, Item, QueueId};
use crate::queue::{self, QueueState};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not load config: {0}")]
    Config(#[source] GatewayError),
    #[error("could not subscribe to backend events: {0}")]
    Subscribe(#[from] BridgeError),
    #[error("session is shut down")]
    Closed,
    #[error(transparent)]
    Command(#[from] GatewayError),
}

/// The three stores behind one dispatch.
///
/// Every action reaches every store; each reducer ignores what it does not
/// own. No store reads another's state.
pub struct Stores {
    queue: EffectStore<QueueState, Action, Effect>,
    config: EffectStore<ConfigState, Action, Effect>,
    log: Store<LogState, Action>,
}

impl Stores {
    pub fn new(config: Config) -> Self {
        Self {
            queue: EffectStore::new(QueueState::default(), queue::reducer),
            config: EffectStore::new(ConfigState::new(config), config::reducer),
            log: Store::new(LogState::default(), log::reducer),
        }
    }

    pub fn queue(&self) -> watch::Receiver<QueueState> {
        self.queue.subscribe()
    }

    pub fn config(&self) -> watch::Receiver<ConfigState> {
        self.config.subscribe()
    }

    pub fn log(&self) -> watch::Receiver<LogState> {
        self.log.subscribe()
    }
}

impl EffectStoreLike<Action, Effect> for Stores {
    /// Log lines an action produces are appended within the same dispatch,
    /// ahead of anything already waiting in the action channel.
    fn dispatch(&mut self, action: Action) -> DispatchResult<Effect> {
        let mut result = self.queue.dispatch(action.clone());
        result.merge(self.config.dispatch(action.clone()));

        for effect in std::mem::take(&mut result.effects) {
            match effect {
                Effect::Log(entry) => {
                    if self.log.dispatch(Action::LogAppend(entry)) {
                        result.changed = true;
                    }
                }
                other => result.effects.push(other),
            }
        }

        if self.log.dispatch(action) {
            result.changed = true;
        }
        result
    }
}

/// Turn a reducer's effect into work.
///
/// [`Stores`] applies `Effect::Log` itself; a log effect reaching this point
/// comes from a single-store runtime and is appended after the current action.
pub fn handle_effect(gateway: &CommandGateway, effect: Effect, ctx: &mut EffectContext<Action>) {
    match effect {
        Effect::Invoke(request) => {
            let key = ctx.tasks().next_key(request.kind().name());
            ctx.tasks().spawn(key, request.run(gateway.clone()));
        }
        Effect::Log(entry) => ctx.emit(Action::LogAppend(entry)),
    }
}

/// Read-only copy of all three stores.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub queue: QueueState,
    pub log: LogState,
    pub config: ConfigState,
}

pub struct Session {
    action_tx: mpsc::UnboundedSender<Action>,
    gateway: CommandGateway,
    queue: watch::Receiver<QueueState>,
    log: watch::Receiver<LogState>,
    config: watch::Receiver<ConfigState>,
    bridge: EventBridge<BackendEvent>,
    subscriptions: Vec<Unlisten>,
    cancel: CancellationToken,
    runtime: JoinHandle<()>,
}

impl Session {
    /// Fetch the config, subscribe to every backend event and start the
    /// action loop.
    ///
    /// If the config cannot be loaded, subscriptions already in flight are
    /// detached and the bridge is stopped before the error is returned.
    pub async fn start<T, S>(transport: T, events: S) -> Result<Self, SessionError>
    where
        T: Transport,
        S: Stream<Item = RawEvent> + Send + 'static,
    {
        let gateway = CommandGateway::new(transport);
        let bridge = EventBridge::<BackendEvent>::spawn(events);

        let stores = Stores::new(Config::default());
        let queue = stores.queue();
        let log = stores.log();
        let config = stores.config();

        let mut runtime = EffectRuntime::<Action, Effect, Stores>::from_store(stores)
            .with_middleware(LoggingMiddleware::new());
        let action_tx = runtime.action_tx();

        let pending: Vec<_> = EventKind::ALL
            .into_iter()
            .map(|kind| {
                let tx = action_tx.clone();
                bridge.subscribe(kind, move |event: &BackendEvent| {
                    tx.send(Action::Backend(event.clone()))
                        .map_err(|_| HandlerError::new("action loop stopped"))
                })
            })
            .collect();

        let initial = match gateway.invoke(GetConfig {}).await {
            Ok(initial) => initial,
            Err(error) => {
                warn!(%error, "Config fetch failed, tearing down subscriptions");
                unlisten_all(pending).await;
                bridge.shutdown().await;
                return Err(SessionError::Config(error));
            }
        };

        let mut subscriptions = Vec::with_capacity(pending.len());
        let mut failure = None;
        for result in join_all(pending).await {
            match result {
                Ok(unlisten) => subscriptions.push(unlisten),
                Err(error) => failure = Some(error),
            }
        }
        if let Some(error) = failure {
            subscriptions.into_iter().for_each(Unlisten::unlisten);
            bridge.shutdown().await;
            return Err(error.into());
        }

        runtime.step(Action::ConfigDidUpdate(initial), &mut |effect, ctx| {
            handle_effect(&gateway, effect, ctx)
        });

        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let effect_gateway = gateway.clone();
        let handle = tokio::spawn(async move {
            runtime
                .run(loop_cancel, move |effect, ctx| {
                    handle_effect(&effect_gateway, effect, ctx)
                })
                .await;
        });

        info!(subscriptions = subscriptions.len(), "Session started");

        Ok(Self {
            action_tx,
            gateway,
            queue,
            log,
            config,
            bridge,
            subscriptions,
            cancel,
            runtime: handle,
        })
    }

    /// Feed an action into the loop.
    pub fn dispatch(&self, action: Action) -> Result<(), SessionError> {
        self.action_tx.send(action).map_err(|_| SessionError::Closed)
    }

    pub fn enqueue(&self, urls: Vec<String>) -> Result<(), SessionError> {
        self.dispatch(Action::QueueAdd { urls })
    }

    pub fn remove(&self, id: QueueId) -> Result<(), SessionError> {
        self.dispatch(Action::QueueRemove { id })
    }

    pub fn request_download(&self, id: QueueId) -> Result<(), SessionError> {
        self.dispatch(Action::QueueRequestDownload { id })
    }

    pub fn download_all(&self) -> Result<(), SessionError> {
        self.dispatch(Action::QueueDownloadAll)
    }

    pub fn clear_queue(&self) -> Result<(), SessionError> {
        self.dispatch(Action::QueueClear)
    }

    pub fn set_config(&self, config: Config) -> Result<(), SessionError> {
        self.dispatch(Action::ConfigSet(config))
    }

    pub fn clear_log(&self) -> Result<(), SessionError> {
        self.dispatch(Action::LogClear)
    }

    /// Resolve a URL without touching the queue.
    pub async fn get_item(&self, url: impl Into<String>) -> Result<Item, SessionError> {
        Ok(self.gateway.invoke(GetItem { url: url.into() }).await?)
    }

    /// Resolve every song a URL names (an album, a playlist) without touching the queue.
    pub async fn get_songs(&self, url: impl Into<String>) -> Result<Vec<Item>, SessionError> {
        Ok(self.gateway.invoke(GetSongs { url: url.into() }).await?)
    }

    pub fn queue(&self) -> watch::Receiver<QueueState> {
        self.queue.clone()
    }

    pub fn log(&self) -> watch::Receiver<LogState> {
        self.log.clone()
    }

    pub fn config(&self) -> watch::Receiver<ConfigState> {
        self.config.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            queue: self.queue.borrow().clone(),
            log: self.log.borrow().clone(),
            config: self.config.borrow().clone(),
        }
    }

    pub fn gateway(&self) -> &CommandGateway {
        &self.gateway
    }

    /// Detach every subscription, stop the loop (aborting in-flight command
    /// tasks) and stop the event pump. Backend-side work is not cancelled.
    pub async fn shutdown(self) {
        let Session {
            subscriptions,
            cancel,
            runtime,
            bridge,
            ..
        } = self;

        subscriptions.into_iter().for_each(Unlisten::unlisten);
        cancel.cancel();
        if let Err(error) = runtime.await {
            warn!(%error, "Action loop ended abnormally");
        }
        bridge.shutdown().await;

        info!("Session stopped");
    }
}
