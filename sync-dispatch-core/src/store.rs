//! Observable state store with reducer pattern

use crate::action::{Action, ActionCategory, ActionSummary};
use std::marker::PhantomData;
use tokio::sync::watch;

/// A reducer function that handles actions and mutates state
///
/// Returns `true` if the state changed and observers should be notified.
pub type Reducer<S, A> = fn(&mut S, A) -> bool;

/// Observable state container with a Redux-like reducer
///
/// The store is the only writer of its state. Every dispatch that the reducer
/// reports as a change is published to subscribers through a `watch` channel,
/// so readers always see the latest confirmed value and never a half-applied one.
///
/// # Type Parameters
/// * `S` - The state type
/// * `A` - The action type (must implement `Action`)
///
/// # Example
/// ```ignore
/// #[derive(Default)]
/// struct History {
///     lines: Vec<String>,
/// }
///
/// #[derive(Action, Clone, Debug)]
/// enum HistoryAction {
///     Push(String),
///     Clear,
/// }
///
/// fn reducer(state: &mut History, action: HistoryAction) -> bool {
///     match action {
///         HistoryAction::Push(line) => {
///             state.lines.push(line);
///             true
///         }
///         HistoryAction::Clear => {
///             let changed = !state.lines.is_empty();
///             state.lines.clear();
///             changed
///         }
///     }
/// }
///
/// let mut store = Store::new(History::default(), reducer);
/// let mut rx = store.subscribe();
/// store.dispatch(HistoryAction::Push("hello".into()));
/// assert!(rx.has_changed().unwrap());
/// ```
pub struct Store<S, A: Action> {
    state: watch::Sender<S>,
    reducer: Reducer<S, A>,
    _marker: PhantomData<fn(A)>,
}

impl<S, A: Action> Store<S, A> {
    /// Create a new store with initial state and reducer
    pub fn new(state: S, reducer: Reducer<S, A>) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            state,
            reducer,
            _marker: PhantomData,
        }
    }

    /// Dispatch an action to the store
    ///
    /// The reducer is called with the current state and action.
    /// Subscribers are only woken when it returns `true`.
    pub fn dispatch(&mut self, action: A) -> bool {
        let reducer = self.reducer;
        self.state.send_if_modified(|state| reducer(state, action))
    }

    /// Borrow the current state
    ///
    /// Do not hold the returned guard across an `.await`.
    pub fn state(&self) -> watch::Ref<'_, S> {
        self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.state.subscribe()
    }

    /// Modify the state outside the reducer and notify subscribers
    ///
    /// Use this sparingly - prefer dispatching actions for state changes.
    pub fn modify(&mut self, f: impl FnOnce(&mut S)) {
        self.state.send_modify(f);
    }
}

/// Middleware trait for intercepting actions
///
/// Implement this trait to add logging or other cross-cutting concerns
/// to the runtime loop.
pub trait Middleware<A: Action> {
    /// Called before the action is dispatched to the stores
    fn before(&mut self, action: &A);

    /// Called after the action is processed by the stores
    fn after(&mut self, action: &A, state_changed: bool);
}

/// A no-op middleware that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMiddleware;

impl<A: Action> Middleware<A> for NoopMiddleware {
    fn before(&mut self, _action: &A) {}
    fn after(&mut self, _action: &A, _state_changed: bool) {}
}

/// Middleware that traces every action
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    /// Whether to log before dispatch
    pub log_before: bool,
    /// Whether to log after dispatch
    pub log_after: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware with default settings (log after only)
    pub fn new() -> Self {
        Self {
            log_before: false,
            log_after: true,
        }
    }

    /// Create a logging middleware that logs both before and after
    pub fn verbose() -> Self {
        Self {
            log_before: true,
            log_after: true,
        }
    }
}

impl<A: ActionSummary + ActionCategory> Middleware<A> for LoggingMiddleware {
    fn before(&mut self, action: &A) {
        if self.log_before {
            tracing::debug!(
                action = %action.name(),
                category = action.category().unwrap_or("uncategorized"),
                summary = %action.summary(),
                "Dispatching action"
            );
        }
    }

    fn after(&mut self, action: &A, state_changed: bool) {
        if self.log_after {
            tracing::debug!(
                action = %action.name(),
                state_changed = state_changed,
                "Action processed"
            );
        }
    }
}
