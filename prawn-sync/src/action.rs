//! Actions applied by the session's action loop
//!
//! Intents (`QueueAdd`, `ConfigSet`) ask the backend for something and never
//! change state on their own. `Did*` results carry what the backend
//! confirmed. `Backend` wraps pushed events.

use sync_dispatch::{ActionSummary, GatewayError};

use crate::command::CommandKind;
use crate::event::BackendEvent;
use crate::log::LogEntry;
use crate::model::{Config, QueueId, QueueItem};

/// # Categories (inferred from naming):
/// - `queue`: QueueAdd, QueueDidAdd, QueueRemove, ...
/// - `config`: ConfigSet, ConfigDidUpdate
/// - `log`: LogAppend, LogClear
/// - `command`: CommandDidFail
/// - `backend`: Backend
#[derive(sync_dispatch::Action, Clone, Debug, PartialEq)]
#[action(infer_categories)]
pub enum Action {
    // ===== Queue =====
    QueueAdd { urls: Vec<String> },
    QueueRemove { id: QueueId },
    QueueRequestDownload { id: QueueId },
    QueueDownloadAll,
    QueueClear,

    QueueDidAdd { entries: Vec<QueueItem> },
    QueueDidRemove { id: QueueId },
    QueueDidRequestDownload { id: QueueId },
    QueueDidDownloadAll,
    QueueDidClear,

    // ===== Config =====
    ConfigSet(Config),
    ConfigDidUpdate(Config),

    // ===== Log =====
    LogAppend(LogEntry),
    LogClear,

    // ===== Backend =====
    #[action(category = "backend")]
    Backend(BackendEvent),

    /// Any queued command that the backend did not confirm.
    CommandDidFail {
        command: CommandKind,
        error: GatewayError,
    },
}

impl ActionSummary for Action {
    fn summary(&self) -> String {
        match self {
            Action::QueueDidAdd { entries } => format!("QueueDidAdd {{ entries: {} }}", entries.len()),
            Action::Backend(BackendEvent::QueueUpdate(entries)) => {
                format!("Backend(QueueUpdate {{ entries: {} }})", entries.len())
            }
            Action::CommandDidFail { command, error } => {
                format!("CommandDidFail {{ {}: {} }}", command, error)
            }
            _ => format!("{:?}", self),
        }
    }
}
