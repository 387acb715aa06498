//! Queue store: local mirror of the backend's download queue
//!
//! Per-entry state machine:
//!
//! ```text
//! Inactive ──start──▶ Downloading ──finish──▶ (removed, success logged)
//!     │                    │
//!     └──download_error────┴──▶ Error ──start / request_download──▶ Downloading
//! ```
//!
//! Entries are keyed by their backend-assigned id, so an event may safely
//! arrive before the command that created its entry has resolved locally.

use std::collections::HashSet;

use sync_dispatch::{DispatchResult, GatewayError};
use tracing::debug;

use crate::action::Action;
use crate::command::Request;
use crate::effect::Effect;
use crate::event::BackendEvent;
use crate::log;
use crate::model::{ItemRef, QueueId, QueueItem, QueueStatus};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueState {
    /// Entries in backend order. Ids are unique.
    pub items: Vec<QueueItem>,
    /// Most recent queue command the backend did not confirm.
    pub last_error: Option<GatewayError>,
    /// Ids the backend has already retired. A late add result never brings
    /// them back; only a snapshot that lists them again does.
    retired: HashSet<QueueId>,
}

impl QueueState {
    pub fn get(&self, id: QueueId) -> Option<&QueueItem> {
        self.items.iter().find(|entry| entry.id == id)
    }

    pub fn ids(&self) -> Vec<QueueId> {
        self.items.iter().map(|entry| entry.id).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_retired(&self, id: QueueId) -> bool {
        self.retired.contains(&id)
    }

    /// True once nothing is waiting or downloading.
    pub fn is_settled(&self) -> bool {
        self.items.iter().all(|entry| entry.status.is_error())
    }
}

fn invoke(request: Request) -> DispatchResult<Effect> {
    DispatchResult::effect(Effect::Invoke(request))
}

pub fn reducer(state: &mut QueueState, action: Action) -> DispatchResult<Effect> {
    match action {
        // ===== Intents: nothing changes until the backend confirms =====
        Action::QueueAdd { urls } => invoke(Request::AddToQueue(urls)),
        Action::QueueRemove { id } => invoke(Request::RemoveFromQueue(id)),
        Action::QueueRequestDownload { id } => invoke(Request::RequestDownload(id)),
        Action::QueueDownloadAll => invoke(Request::DownloadQueue),
        Action::QueueClear => invoke(Request::ClearQueue),

        // ===== Confirmed results =====
        Action::QueueDidAdd { entries } => DispatchResult::changed_if(merge(state, entries)),

        Action::QueueDidRemove { id } => {
            state.retired.insert(id);
            let before = state.items.len();
            state.items.retain(|entry| entry.id != id);
            DispatchResult::changed_if(state.items.len() != before)
        }

        Action::QueueDidRequestDownload { id } => {
            let changed = state
                .items
                .iter_mut()
                .find(|entry| entry.id == id)
                .is_some_and(|entry| set_status(entry, QueueStatus::Downloading));
            DispatchResult::changed_if(changed)
        }

        Action::QueueDidDownloadAll => {
            let mut changed = false;
            for entry in state.items.iter_mut() {
                if entry.status == QueueStatus::Inactive {
                    entry.status = QueueStatus::Downloading;
                    changed = true;
                }
            }
            DispatchResult::changed_if(changed)
        }

        Action::QueueDidClear => {
            let changed = !state.items.is_empty();
            state.retired.extend(state.items.drain(..).map(|entry| entry.id));
            DispatchResult::changed_if(changed)
        }

        Action::CommandDidFail { command, error } if command.is_queue() => {
            state.last_error = Some(error);
            DispatchResult::changed()
        }

        Action::Backend(event) => reconcile(state, event),

        _ => DispatchResult::unchanged(),
    }
}

/// Append entries whose ids are neither present nor retired.
fn merge(state: &mut QueueState, entries: Vec<QueueItem>) -> bool {
    let mut changed = false;
    for entry in entries {
        if state.is_retired(entry.id) {
            debug!(id = entry.id, "Add result for an entry already retired");
            continue;
        }
        if state.get(entry.id).is_none() {
            state.items.push(entry);
            changed = true;
        }
    }
    changed
}

fn set_status(entry: &mut QueueItem, status: QueueStatus) -> bool {
    if entry.status == status {
        return false;
    }
    entry.status = status;
    true
}

fn reconcile(state: &mut QueueState, event: BackendEvent) -> DispatchResult<Effect> {
    match event {
        BackendEvent::QueueUpdate(entries) => {
            let mut seen = HashSet::new();
            let next: Vec<QueueItem> = entries
                .into_iter()
                .filter(|entry| seen.insert(entry.id))
                .collect();

            for entry in &state.items {
                if !seen.contains(&entry.id) {
                    state.retired.insert(entry.id);
                }
            }
            state.retired.retain(|id| !seen.contains(id));

            if state.items == next {
                return DispatchResult::unchanged();
            }
            state.items = next;
            DispatchResult::changed()
        }

        BackendEvent::Started(target) => match target.locate(&state.items) {
            Some(index) => DispatchResult::changed_if(set_status(
                &mut state.items[index],
                QueueStatus::Downloading,
            )),
            None => {
                debug!(?target, "Start for an item not in the queue");
                DispatchResult::unchanged()
            }
        },

        BackendEvent::Finished(target) => match target.locate(&state.items) {
            Some(index) => {
                let entry = state.items.remove(index);
                state.retired.insert(entry.id);
                DispatchResult::changed_with(Effect::Log(log::format_success(&entry.item)))
            }
            None => {
                if let ItemRef::Queue(id) = target {
                    state.retired.insert(id);
                }
                match target.item() {
                    Some(item) => DispatchResult::effect(Effect::Log(log::format_success(item))),
                    None => {
                        debug!(?target, "Finish for an item not in the queue");
                        DispatchResult::unchanged()
                    }
                }
            }
        },

        BackendEvent::DownloadError { target, message } => {
            match target.locate(&state.items) {
                Some(index) => {
                    let entry = &mut state.items[index];
                    let logged = log::format_download_error(&entry.item.label(), message.as_deref());
                    entry.status = QueueStatus::Error { message };
                    DispatchResult::changed_with(Effect::Log(logged))
                }
                None => DispatchResult::effect(Effect::Log(log::format_download_error(
                    &target.describe(),
                    message.as_deref(),
                ))),
            }
        }

        BackendEvent::SongNotFound(_)
        | BackendEvent::AlbumNotFound(_)
        | BackendEvent::Malformed { .. } => DispatchResult::unchanged(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::model::{Item, Source};
    use sync_dispatch::TransportError;

    fn entry(id: QueueId, title: &str) -> QueueItem {
        QueueItem::new(
            id,
            Item {
                id: format!("trk{}", id),
                title: title.into(),
                artist: "Artist".into(),
                album: None,
                source: Source::Youtube,
                url: String::new(),
            },
        )
    }

    fn state_with(entries: Vec<QueueItem>) -> QueueState {
        QueueState {
            items: entries,
            ..QueueState::default()
        }
    }

    fn backend(event: BackendEvent) -> Action {
        Action::Backend(event)
    }

    #[test]
    fn test_intents_only_emit_commands() {
        let mut state = state_with(vec![entry(1, "A")]);

        let result = reducer(&mut state, Action::QueueRemove { id: 1 });

        assert!(!result.changed);
        assert_eq!(
            result.effects,
            vec![Effect::Invoke(Request::RemoveFromQueue(1))]
        );
        assert_eq!(state.ids(), vec![1]);

        let result = reducer(&mut state, Action::QueueRequestDownload { id: 1 });
        assert_eq!(state.get(1).map(|e| &e.status), Some(&QueueStatus::Inactive));
        assert_eq!(
            result.effects,
            vec![Effect::Invoke(Request::RequestDownload(1))]
        );
    }

    #[test]
    fn test_did_add_appends_in_order() {
        let mut state = QueueState::default();

        reducer(&mut state, Action::QueueDidAdd { entries: vec![entry(1, "A")] });
        reducer(
            &mut state,
            Action::QueueDidAdd {
                entries: vec![entry(2, "B"), entry(3, "C")],
            },
        );

        assert_eq!(state.ids(), vec![1, 2, 3]);
        assert!(state.items.iter().all(|e| e.status == QueueStatus::Inactive));
    }

    #[test]
    fn test_did_add_merges_by_identity() {
        let mut state = state_with(vec![entry(1, "A"), entry(2, "B")]);

        let result = reducer(
            &mut state,
            Action::QueueDidAdd {
                entries: vec![entry(2, "B"), entry(3, "C")],
            },
        );

        assert!(result.changed);
        assert_eq!(state.ids(), vec![1, 2, 3]);
    }

    #[test]
    fn test_late_add_does_not_revive_finished_entry() {
        let mut state = QueueState::default();

        reducer(&mut state, backend(BackendEvent::QueueUpdate(vec![entry(5, "E")])));
        reducer(&mut state, backend(BackendEvent::Started(ItemRef::Queue(5))));
        reducer(&mut state, backend(BackendEvent::Finished(ItemRef::Queue(5))));
        reducer(&mut state, backend(BackendEvent::QueueUpdate(vec![])));

        let result = reducer(&mut state, Action::QueueDidAdd { entries: vec![entry(5, "E")] });

        assert!(!result.changed);
        assert!(state.is_empty());
        assert!(state.is_retired(5));
    }

    #[test]
    fn test_late_add_skips_entries_a_snapshot_dropped() {
        let mut state = QueueState::default();

        reducer(
            &mut state,
            backend(BackendEvent::QueueUpdate(vec![entry(1, "A"), entry(2, "B")])),
        );
        reducer(&mut state, backend(BackendEvent::QueueUpdate(vec![entry(1, "A")])));
        reducer(
            &mut state,
            Action::QueueDidAdd {
                entries: vec![entry(2, "B"), entry(3, "C")],
            },
        );

        assert_eq!(state.ids(), vec![1, 3]);
    }

    #[test]
    fn test_late_add_skips_removed_and_cleared_entries() {
        let mut state = state_with(vec![entry(1, "A"), entry(2, "B")]);

        reducer(&mut state, Action::QueueDidRemove { id: 1 });
        reducer(&mut state, Action::QueueDidClear);
        reducer(&mut state, Action::QueueDidRemove { id: 9 });
        reducer(
            &mut state,
            Action::QueueDidAdd {
                entries: vec![entry(1, "A"), entry(2, "B"), entry(9, "I")],
            },
        );

        assert!(state.is_empty());
    }

    #[test]
    fn test_snapshot_listing_a_retired_id_restores_it() {
        let mut state = state_with(vec![entry(1, "A")]);

        reducer(&mut state, backend(BackendEvent::QueueUpdate(vec![])));
        assert!(state.is_retired(1));

        reducer(&mut state, backend(BackendEvent::QueueUpdate(vec![entry(1, "A")])));

        assert!(!state.is_retired(1));
        assert_eq!(state.ids(), vec![1]);
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let mut state = state_with(vec![entry(1, "A")]);

        let result = reducer(&mut state, Action::QueueDidRemove { id: 99 });

        assert!(!result.changed);
        assert_eq!(state.ids(), vec![1]);
    }

    #[test]
    fn test_request_download_confirmed() {
        let mut state = state_with(vec![entry(1, "A")]);

        assert!(reducer(&mut state, Action::QueueDidRequestDownload { id: 1 }).changed);
        assert_eq!(state.items[0].status, QueueStatus::Downloading);
        assert!(!reducer(&mut state, Action::QueueDidRequestDownload { id: 1 }).changed);
    }

    #[test]
    fn test_download_all_skips_errored_entries() {
        let mut state = state_with(vec![entry(1, "A"), entry(2, "B")]);
        state.items[1].status = QueueStatus::Error { message: None };

        reducer(&mut state, Action::QueueDidDownloadAll);

        assert_eq!(state.items[0].status, QueueStatus::Downloading);
        assert!(state.items[1].status.is_error());
    }

    #[test]
    fn test_snapshot_replaces_and_dedups() {
        let mut state = state_with(vec![entry(1, "A")]);

        let result = reducer(
            &mut state,
            backend(BackendEvent::QueueUpdate(vec![
                entry(3, "C"),
                entry(2, "B"),
                entry(3, "C again"),
            ])),
        );

        assert!(result.changed);
        assert_eq!(state.ids(), vec![3, 2]);
        assert_eq!(state.items[0].item.title, "C");

        let same = state.items.clone();
        assert!(!reducer(&mut state, backend(BackendEvent::QueueUpdate(same))).changed);
    }

    #[test]
    fn test_finish_removes_and_logs_success() {
        let mut state = state_with(vec![entry(1, "A"), entry(2, "B")]);

        let result = reducer(
            &mut state,
            backend(BackendEvent::Finished(ItemRef::Key("trk1".into()))),
        );

        assert!(result.changed);
        assert_eq!(state.ids(), vec![2]);
        assert!(matches!(
            &result.effects[..],
            [Effect::Log(entry)] if entry.success && entry.content == "Downloaded Artist - A"
        ));
    }

    #[test]
    fn test_finish_for_unknown_item() {
        let mut state = state_with(vec![entry(1, "A")]);

        let bare = reducer(&mut state, backend(BackendEvent::Finished(ItemRef::Queue(7))));
        assert!(!bare.changed);
        assert!(bare.effects.is_empty());

        let full = reducer(
            &mut state,
            backend(BackendEvent::Finished(ItemRef::Item(entry(7, "G").item))),
        );
        assert!(!full.changed);
        assert_eq!(full.effects.len(), 1);
        assert_eq!(state.ids(), vec![1]);
    }

    #[test]
    fn test_download_error_marks_and_logs_failure() {
        let mut state = state_with(vec![entry(1, "A")]);

        let result = reducer(
            &mut state,
            backend(BackendEvent::DownloadError {
                target: ItemRef::Queue(1),
                message: Some("HTTP 403".into()),
            }),
        );

        assert!(result.changed);
        assert_eq!(
            state.items[0].status,
            QueueStatus::Error {
                message: Some("HTTP 403".into())
            }
        );
        assert!(matches!(
            &result.effects[..],
            [Effect::Log(entry)]
                if !entry.success && entry.content == "Error while downloading Artist - A (HTTP 403)."
        ));
    }

    #[test]
    fn test_download_error_for_unknown_item_still_logs() {
        let mut state = QueueState::default();

        let result = reducer(
            &mut state,
            backend(BackendEvent::DownloadError {
                target: ItemRef::Queue(5),
                message: None,
            }),
        );

        assert!(!result.changed);
        assert!(matches!(
            &result.effects[..],
            [Effect::Log(entry)] if entry.content == "Error while downloading 5."
        ));
    }

    #[test]
    fn test_error_is_sticky_until_fresh_start() {
        let mut state = state_with(vec![entry(1, "A")]);
        state.items[0].status = QueueStatus::Error { message: None };

        reducer(&mut state, Action::QueueDidDownloadAll);
        assert!(state.items[0].status.is_error());

        reducer(&mut state, backend(BackendEvent::Started(ItemRef::Queue(1))));
        assert_eq!(state.items[0].status, QueueStatus::Downloading);
    }

    #[test]
    fn test_queue_command_failure_is_recorded() {
        let mut state = state_with(vec![entry(1, "A")]);
        let error = GatewayError::Transport {
            command: "remove_from_queue",
            source: TransportError::Rejected("busy".into()),
        };

        let result = reducer(
            &mut state,
            Action::CommandDidFail {
                command: CommandKind::RemoveFromQueue,
                error: error.clone(),
            },
        );

        assert!(result.changed);
        assert_eq!(state.last_error, Some(error));
        assert_eq!(state.ids(), vec![1]);
    }

    #[test]
    fn test_config_failure_is_ignored() {
        let mut state = QueueState::default();
        let error = GatewayError::Malformed {
            command: "update_config",
            detail: "x".into(),
        };

        let result = reducer(
            &mut state,
            Action::CommandDidFail {
                command: CommandKind::UpdateConfig,
                error,
            },
        );

        assert!(!result.changed);
        assert_eq!(state.last_error, None);
    }
}
