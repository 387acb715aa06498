//! Activity log: outcome history and the formatters that produce it
//!
//! Entries are never edited or reordered once appended. The only way to
//! shrink the history is [`Action::LogClear`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sync_dispatch::GatewayError;

use crate::action::Action;
use crate::command::CommandKind;
use crate::event::BackendEvent;
use crate::model::Item;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub success: bool,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn success(content: impl Into<String>) -> Self {
        Self::new(true, content)
    }

    pub fn failure(content: impl Into<String>) -> Self {
        Self::new(false, content)
    }

    fn new(success: bool, content: impl Into<String>) -> Self {
        Self {
            success,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

pub fn format_success(item: &Item) -> LogEntry {
    LogEntry::success(format!("Downloaded {}", item.label()))
}

pub fn format_album_not_found(album_id: u64) -> LogEntry {
    LogEntry::failure(format!("Album {} not found", album_id))
}

pub fn format_song_not_found(song_id: u64) -> LogEntry {
    LogEntry::failure(format!("Song {} not found", song_id))
}

/// `subject` is the item label, or whatever identity the event carried when
/// the item is unknown.
pub fn format_download_error(subject: &str, message: Option<&str>) -> LogEntry {
    let content = match message {
        Some(message) => format!("Error while downloading {} ({}).", subject, message),
        None => format!("Error while downloading {}.", subject),
    };
    LogEntry::failure(content)
}

pub fn format_command_failure(command: CommandKind, error: &GatewayError) -> LogEntry {
    LogEntry::failure(format!("{} failed: {}", command, error))
}

pub fn format_malformed(name: &str, detail: &str) -> LogEntry {
    LogEntry::failure(format!("Dropped malformed {} event: {}", name, detail))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogState {
    pub entries: Vec<LogEntry>,
}

impl LogState {
    pub fn failures(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|entry| !entry.success)
    }

    pub fn successes(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|entry| entry.success)
    }
}

/// Item-level outcomes arrive as [`Action::LogAppend`] from the queue, which
/// knows the item. Everything else is formatted here from the action itself.
pub fn reducer(state: &mut LogState, action: Action) -> bool {
    let entry = match action {
        Action::LogAppend(entry) => entry,
        Action::LogClear => {
            let changed = !state.entries.is_empty();
            state.entries.clear();
            return changed;
        }
        Action::Backend(BackendEvent::SongNotFound(id)) => format_song_not_found(id),
        Action::Backend(BackendEvent::AlbumNotFound(id)) => format_album_not_found(id),
        Action::Backend(BackendEvent::Malformed { name, detail }) => {
            tracing::warn!(event = %name, %detail, "Dropped malformed backend event");
            format_malformed(&name, &detail)
        }
        Action::CommandDidFail { command, error } => format_command_failure(command, &error),
        _ => return false,
    };

    state.entries.push(entry);
    true
}
