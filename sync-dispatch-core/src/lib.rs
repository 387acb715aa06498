//! Core traits and types for sync-dispatch
//!
//! Client-side state for an out-of-process backend, kept in sync through a
//! typed command/event bridge and a Redux/Elm-style action loop.
//!
//! # Core Concepts
//!
//! - **Command gateway**: typed request/response calls to the backend
//! - **Event bridge**: typed subscription to events the backend pushes
//! - **Store**: observable state container with reducer pattern
//! - **Effects**: reducers describe backend calls; the runtime performs them
//! - **Runtime**: one loop applies every action, whatever its origin
//!
//! # Intent and result actions
//!
//! Stores never change on a caller's say-so alone. A caller dispatches an
//! intent (`QueueRemove { id }`); the reducer leaves state untouched and
//! returns an effect; the effect runs as a command task; the task's outcome
//! comes back as a result action (`QueueDidRemove { id }` or `CommandDidFail`)
//! and only that result mutates the store.
//!
//! ```ignore
//! use sync_dispatch_core::prelude::*;
//!
//! #[derive(Action, Clone, Debug)]
//! #[action(infer_categories)]
//! enum Action {
//!     // Intent: asks the backend
//!     QueueRemove { id: u64 },
//!     // Result: the backend confirmed
//!     QueueDidRemove { id: u64 },
//! }
//!
//! fn reducer(state: &mut Vec<u64>, action: Action) -> DispatchResult<Effect> {
//!     match action {
//!         Action::QueueRemove { id } => DispatchResult::effect(Effect::Remove { id }),
//!         Action::QueueDidRemove { id } => {
//!             let before = state.len();
//!             state.retain(|item| *item != id);
//!             DispatchResult::changed_if(state.len() != before)
//!         }
//!     }
//! }
//!
//! let mut runtime = EffectRuntime::new(Vec::new(), reducer);
//! runtime.run(cancel, |effect, ctx| match effect {
//!     Effect::Remove { id } => {
//!         let gateway = gateway.clone();
//!         let key = ctx.tasks().next_key("remove_from_queue");
//!         ctx.tasks().spawn(key, async move {
//!             gateway.invoke(RemoveFromQueue { id }).await.map_or_else(
//!                 |error| Action::CommandDidFail { error },
//!                 |()| Action::QueueDidRemove { id },
//!             )
//!         });
//!     }
//! }).await;
//! ```
//!
//! The `Did*` naming convention identifies result actions. With
//! `#[action(infer_categories)]`, `QueueRemove` and `QueueDidRemove` both get
//! category `"queue"`.

pub mod action;
pub mod bridge;
pub mod command;
pub mod effect;
pub mod runtime;
pub mod store;
pub mod tasks;
pub mod testing;

// Core trait exports
pub use action::{Action, ActionCategory, ActionSummary};

// Backend plumbing
pub use bridge::{
    unlisten_all, BridgeError, BridgeEvent, EventBridge, Handler, HandlerError, RawEvent, Unlisten,
};
pub use command::{Command, CommandGateway, GatewayError, Transport, TransportError};

// Store exports
pub use store::{LoggingMiddleware, Middleware, NoopMiddleware, Reducer, Store};

// Effect exports
pub use effect::{DispatchResult, EffectReducer, EffectStore, EffectStoreLike};
pub use runtime::{EffectContext, EffectRuntime};
pub use tasks::{TaskKey, TaskManager};

// Testing exports
pub use testing::{event_channel, MockTransport, TestHarness};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::{Action, ActionCategory, ActionSummary};
    pub use crate::bridge::{
        unlisten_all, BridgeEvent, EventBridge, HandlerError, RawEvent, Unlisten,
    };
    pub use crate::command::{Command, CommandGateway, GatewayError, Transport, TransportError};
    pub use crate::effect::{DispatchResult, EffectReducer, EffectStore, EffectStoreLike};
    pub use crate::runtime::{EffectContext, EffectRuntime};
    pub use crate::store::{LoggingMiddleware, Middleware, NoopMiddleware, Reducer, Store};
    pub use crate::tasks::{TaskKey, TaskManager};
}
