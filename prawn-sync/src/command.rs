//! The closed set of backend commands

use std::fmt;

use serde::{Deserialize, Serialize};
use sync_dispatch::{Command, CommandGateway};

use crate::action::Action;
use crate::model::{Config, Item, QueueId, QueueItem};

/// Every command the backend understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    GetConfig,
    UpdateConfig,
    AddToQueue,
    RemoveFromQueue,
    RequestDownload,
    DownloadQueue,
    ClearQueue,
    GetItem,
    GetSongs,
}

impl CommandKind {
    pub const ALL: [CommandKind; 9] = [
        CommandKind::GetConfig,
        CommandKind::UpdateConfig,
        CommandKind::AddToQueue,
        CommandKind::RemoveFromQueue,
        CommandKind::RequestDownload,
        CommandKind::DownloadQueue,
        CommandKind::ClearQueue,
        CommandKind::GetItem,
        CommandKind::GetSongs,
    ];

    /// Wire name.
    pub const fn name(self) -> &'static str {
        match self {
            CommandKind::GetConfig => "get_config",
            CommandKind::UpdateConfig => "update_config",
            CommandKind::AddToQueue => "add_to_queue",
            CommandKind::RemoveFromQueue => "remove_from_queue",
            CommandKind::RequestDownload => "request_download",
            CommandKind::DownloadQueue => "download_queue",
            CommandKind::ClearQueue => "clear_queue",
            CommandKind::GetItem => "get_item",
            CommandKind::GetSongs => "get_songs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Commands whose outcome belongs to the queue.
    pub fn is_queue(self) -> bool {
        matches!(
            self,
            CommandKind::AddToQueue
                | CommandKind::RemoveFromQueue
                | CommandKind::RequestDownload
                | CommandKind::DownloadQueue
                | CommandKind::ClearQueue
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetConfig {}

impl Command for GetConfig {
    const NAME: &'static str = CommandKind::GetConfig.name();
    type Output = Config;
}

/// Replace the config. Answers with the value the backend actually stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub config: Config,
}

impl Command for UpdateConfig {
    const NAME: &'static str = CommandKind::UpdateConfig.name();
    type Output = Config;
}

/// Resolve URLs and append what they name to the queue.
///
/// Answers with the accepted entries and their backend-assigned ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToQueue {
    pub urls: Vec<String>,
}

impl Command for AddToQueue {
    const NAME: &'static str = CommandKind::AddToQueue.name();
    type Output = Vec<QueueItem>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveFromQueue {
    pub id: QueueId,
}

impl Command for RemoveFromQueue {
    const NAME: &'static str = CommandKind::RemoveFromQueue.name();
    type Output = ();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDownload {
    pub id: QueueId,
}

impl Command for RequestDownload {
    const NAME: &'static str = CommandKind::RequestDownload.name();
    type Output = ();
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadQueue {}

impl Command for DownloadQueue {
    const NAME: &'static str = CommandKind::DownloadQueue.name();
    type Output = ();
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClearQueue {}

impl Command for ClearQueue {
    const NAME: &'static str = CommandKind::ClearQueue.name();
    type Output = ();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetItem {
    pub url: String,
}

impl Command for GetItem {
    const NAME: &'static str = CommandKind::GetItem.name();
    type Output = Item;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSongs {
    pub url: String,
}

impl Command for GetSongs {
    const NAME: &'static str = CommandKind::GetSongs.name();
    type Output = Vec<Item>;
}

/// A state-changing command queued by a reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    UpdateConfig(Config),
    AddToQueue(Vec<String>),
    RemoveFromQueue(QueueId),
    RequestDownload(QueueId),
    DownloadQueue,
    ClearQueue,
}

impl Request {
    pub fn kind(&self) -> CommandKind {
        match self {
            Request::UpdateConfig(_) => CommandKind::UpdateConfig,
            Request::AddToQueue(_) => CommandKind::AddToQueue,
            Request::RemoveFromQueue(_) => CommandKind::RemoveFromQueue,
            Request::RequestDownload(_) => CommandKind::RequestDownload,
            Request::DownloadQueue => CommandKind::DownloadQueue,
            Request::ClearQueue => CommandKind::ClearQueue,
        }
    }

    /// Issue the command and turn its outcome into a result action.
    pub async fn run(self, gateway: CommandGateway) -> Action {
        let command = self.kind();
        let outcome = match self {
            Request::UpdateConfig(config) => gateway
                .invoke(UpdateConfig { config })
                .await
                .map(Action::ConfigDidUpdate),
            Request::AddToQueue(urls) => gateway
                .invoke(AddToQueue { urls })
                .await
                .map(|entries| Action::QueueDidAdd { entries }),
            Request::RemoveFromQueue(id) => gateway
                .invoke(RemoveFromQueue { id })
                .await
                .map(|()| Action::QueueDidRemove { id }),
            Request::RequestDownload(id) => gateway
                .invoke(RequestDownload { id })
                .await
                .map(|()| Action::QueueDidRequestDownload { id }),
            Request::DownloadQueue => gateway
                .invoke(DownloadQueue {})
                .await
                .map(|()| Action::QueueDidDownloadAll),
            Request::ClearQueue => gateway
                .invoke(ClearQueue {})
                .await
                .map(|()| Action::QueueDidClear),
        };

        outcome.unwrap_or_else(|error| Action::CommandDidFail { command, error })
    }
}
