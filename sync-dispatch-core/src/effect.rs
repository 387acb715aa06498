//! Effect-based state management
//!
//! Reducers stay synchronous and pure. When an action needs the backend, the
//! reducer does not call it: it returns an effect describing the call, and the
//! runtime turns that effect into a spawned command task whose outcome comes
//! back later as another action.
//!
//! # Overview
//!
//! A plain reducer returns `bool` (state changed or not):
//! ```ignore
//! fn reducer(state: &mut S, action: A) -> bool
//! ```
//!
//! An effect-aware reducer returns both change status and effects:
//! ```ignore
//! fn reducer(state: &mut S, action: A) -> DispatchResult<E>
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sync_dispatch::{Action, DispatchResult, EffectStore};
//!
//! enum Effect {
//!     RemoveFromQueue { id: u64 },
//! }
//!
//! #[derive(Clone, Debug, Action)]
//! enum QueueAction {
//!     QueueRemove { id: u64 },
//!     QueueDidRemove { id: u64 },
//! }
//!
//! fn reducer(state: &mut Vec<u64>, action: QueueAction) -> DispatchResult<Effect> {
//!     match action {
//!         // Intent: nothing changes until the backend confirms
//!         QueueAction::QueueRemove { id } => DispatchResult::effect(Effect::RemoveFromQueue { id }),
//!         QueueAction::QueueDidRemove { id } => {
//!             let before = state.len();
//!             state.retain(|item| *item != id);
//!             if state.len() != before {
//!                 DispatchResult::changed()
//!             } else {
//!                 DispatchResult::unchanged()
//!             }
//!         }
//!     }
//! }
//! ```

use std::marker::PhantomData;

use tokio::sync::watch;

use crate::action::Action;

/// Result of dispatching an action to an effect-aware store.
///
/// Contains both the state change indicator and any effects to be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult<E> {
    /// Whether the state was modified by this action.
    pub changed: bool,
    /// Effects to be processed after dispatch.
    pub effects: Vec<E>,
}

impl<E> Default for DispatchResult<E> {
    fn default() -> Self {
        Self::unchanged()
    }
}

impl<E> DispatchResult<E> {
    /// Create a result indicating no state change and no effects.
    #[inline]
    pub fn unchanged() -> Self {
        Self {
            changed: false,
            effects: vec![],
        }
    }

    /// Create a result indicating state changed but no effects.
    #[inline]
    pub fn changed() -> Self {
        Self {
            changed: true,
            effects: vec![],
        }
    }

    /// Create a result with a single effect but no state change.
    #[inline]
    pub fn effect(effect: E) -> Self {
        Self {
            changed: false,
            effects: vec![effect],
        }
    }

    /// Create a result indicating state changed with a single effect.
    #[inline]
    pub fn changed_with(effect: E) -> Self {
        Self {
            changed: true,
            effects: vec![effect],
        }
    }

    /// Create a result from a change flag, with no effects.
    #[inline]
    pub fn changed_if(changed: bool) -> Self {
        Self {
            changed,
            effects: vec![],
        }
    }

    /// Add an effect to this result.
    #[inline]
    pub fn with(mut self, effect: E) -> Self {
        self.effects.push(effect);
        self
    }

    /// Set the changed flag to true.
    #[inline]
    pub fn mark_changed(mut self) -> Self {
        self.changed = true;
        self
    }

    /// Fold another store's result into this one.
    ///
    /// Effects keep their order: ours first, then `other`'s.
    pub fn merge(&mut self, other: DispatchResult<E>) {
        self.changed |= other.changed;
        self.effects.extend(other.effects);
    }

    /// Returns true if there are any effects to process.
    #[inline]
    pub fn has_effects(&self) -> bool {
        !self.effects.is_empty()
    }
}

/// A reducer function that can emit effects.
///
/// Takes mutable state and an action, returns whether state changed
/// and any effects to process.
pub type EffectReducer<S, A, E> = fn(&mut S, A) -> DispatchResult<E>;

/// Anything the runtime can dispatch actions into.
///
/// Implemented by [`EffectStore`] and by application types that fan one
/// action out to several independent stores.
pub trait EffectStoreLike<A: Action, E> {
    fn dispatch(&mut self, action: A) -> DispatchResult<E>;
}

/// An observable store whose reducer can emit effects.
///
/// Like [`Store`](crate::Store), state lives in a `watch` channel and
/// subscribers are notified only when the reducer reports a change.
pub struct EffectStore<S, A, E> {
    state: watch::Sender<S>,
    reducer: EffectReducer<S, A, E>,
    _marker: PhantomData<fn(A) -> E>,
}

impl<S, A, E> EffectStore<S, A, E>
where
    A: Action,
{
    /// Create a new effect store with the given initial state and reducer.
    pub fn new(state: S, reducer: EffectReducer<S, A, E>) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            state,
            reducer,
            _marker: PhantomData,
        }
    }

    /// Borrow the current state.
    #[inline]
    pub fn state(&self) -> watch::Ref<'_, S> {
        self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.state.subscribe()
    }

    /// Dispatch an action to the store.
    ///
    /// The reducer is called with the current state and action,
    /// returning whether state changed and any effects to process.
    pub fn dispatch(&mut self, action: A) -> DispatchResult<E> {
        let reducer = self.reducer;
        let mut result = DispatchResult::unchanged();
        self.state.send_if_modified(|state| {
            result = reducer(state, action);
            result.changed
        });
        result
    }
}

impl<S, A: Action, E> EffectStoreLike<A, E> for EffectStore<S, A, E> {
    fn dispatch(&mut self, action: A) -> DispatchResult<E> {
        EffectStore::dispatch(self, action)
    }
}
