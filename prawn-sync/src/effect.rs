//! Side effects declared by the reducers

use crate::command::Request;
use crate::log::LogEntry;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Run a backend command on its own task.
    Invoke(Request),
    /// Append to the activity log after the current action.
    Log(LogEntry),
}
