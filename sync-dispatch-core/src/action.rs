//! Action traits for type-safe state mutations

use std::fmt::Debug;

/// Marker trait for actions that can be dispatched to a store
///
/// Actions carry both intents issued by the caller (`QueueAdd`) and results
/// that come back from the backend (`QueueDidAdd`, backend events). They should be:
/// - Clone: one action is fanned out to several stores
/// - Debug: for logging
/// - Send + 'static: command tasks and the event pump send them across tasks
///
/// Use `#[derive(Action)]` from `sync-dispatch-macros` to auto-implement this trait.
pub trait Action: Clone + Debug + Send + 'static {
    /// Get the action name for logging and filtering
    fn name(&self) -> &'static str;
}

/// Groups actions by the store or subsystem they belong to.
///
/// Generated by `#[derive(Action)]` with `#[action(infer_categories)]`:
/// `QueueAdd` and `QueueDidAdd` both land in `"queue"`.
pub trait ActionCategory: Action {
    /// The category name, or `None` for uncategorized actions.
    fn category(&self) -> Option<&'static str>;
}

/// Short, log-friendly rendering of an action.
///
/// The default falls back to `Debug`. Override it for actions that carry
/// large payloads such as full queue snapshots.
pub trait ActionSummary: Action {
    fn summary(&self) -> String {
        format!("{:?}", self)
    }
}
