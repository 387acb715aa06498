//! sync-dispatch: reducer stores kept in sync with an out-of-process backend
//!
//! Like Redux/Elm, but the source of truth lives in another process. Callers
//! dispatch intents, the backend answers through typed commands and pushed
//! events, and stores change only when the backend has confirmed.
//!
//! # Example
//! ```ignore
//! use sync_dispatch::prelude::*;
//!
//! #[derive(Action, Clone, Debug)]
//! #[action(infer_categories)]
//! enum MyAction {
//!     QueueRemove { id: u64 },
//!     QueueDidRemove { id: u64 },
//! }
//!
//! let gateway = CommandGateway::new(transport);
//! let bridge = EventBridge::<BackendEvent>::spawn(events);
//! ```

// Re-export everything from core
pub use sync_dispatch_core::*;

// Re-export derive macros
pub use sync_dispatch_macros::Action;

/// Prelude for convenient imports
pub mod prelude {
    pub use sync_dispatch_core::prelude::*;

    // Derive macros
    pub use sync_dispatch_macros::Action;
}
