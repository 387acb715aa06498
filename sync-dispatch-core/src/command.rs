//! Typed request/response gateway to the backend process
//!
//! The backend is reached through a [`Transport`] that only understands a
//! command name and a JSON argument object. [`CommandGateway`] puts types on
//! both ends: a command is a `Serialize` struct that names itself and declares
//! its output, so calling a command with the wrong argument shape, or reading
//! its reply as the wrong type, does not compile.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Serialize)]
//! struct RemoveFromQueue {
//!     id: u64,
//! }
//!
//! impl Command for RemoveFromQueue {
//!     const NAME: &'static str = "remove_from_queue";
//!     type Output = ();
//! }
//!
//! let gateway = CommandGateway::new(transport);
//! gateway.invoke(RemoveFromQueue { id: 7 }).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure reported by the transport layer itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The backend process could not be reached.
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    /// The backend received the command and refused it.
    #[error("backend rejected command: {0}")]
    Rejected(String),
}

/// Error returned by [`CommandGateway::invoke`].
///
/// Cloneable so it can travel inside result actions. The display text leaves
/// the command out; use [`command`](Self::command) for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Arguments could not be serialized.
    #[error("could not encode arguments: {detail}")]
    Encode { command: &'static str, detail: String },
    /// The transport failed or the backend refused the command.
    #[error("{source}")]
    Transport {
        command: &'static str,
        #[source]
        source: TransportError,
    },
    /// The backend answered with something that is not the declared output.
    #[error("malformed response: {detail}")]
    Malformed { command: &'static str, detail: String },
}

impl GatewayError {
    /// Name of the command that failed.
    pub fn command(&self) -> &'static str {
        match self {
            GatewayError::Encode { command, .. }
            | GatewayError::Transport { command, .. }
            | GatewayError::Malformed { command, .. } => command,
        }
    }
}

/// Raw request/response channel to the backend.
///
/// Implementations must not retry, cache or reorder: one call is one
/// backend round-trip.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn invoke(&self, command: &'static str, args: Value) -> Result<Value, TransportError>;
}

/// A backend command with a fixed argument shape and output type.
pub trait Command: Serialize + Send + 'static {
    /// Wire name of the command.
    const NAME: &'static str;
    /// Declared result type. Use `()` for commands that answer `null`.
    type Output: DeserializeOwned + Send + 'static;
}

/// Typed front door to a [`Transport`].
///
/// Cheap to clone; clones share the transport. Calls are independent and
/// may be in flight concurrently.
#[derive(Clone)]
pub struct CommandGateway {
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for CommandGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandGateway").finish_non_exhaustive()
    }
}

impl CommandGateway {
    pub fn new(transport: impl Transport) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// Wrap a transport that is already shared elsewhere.
    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Issue one command and decode its reply.
    pub async fn invoke<C: Command>(&self, command: C) -> Result<C::Output, GatewayError> {
        let args = serde_json::to_value(&command).map_err(|e| GatewayError::Encode {
            command: C::NAME,
            detail: e.to_string(),
        })?;

        debug!(command = C::NAME, "Invoking backend command");

        let reply = self
            .transport
            .invoke(C::NAME, args)
            .await
            .map_err(|source| {
                warn!(command = C::NAME, error = %source, "Backend command failed");
                GatewayError::Transport {
                    command: C::NAME,
                    source,
                }
            })?;

        serde_json::from_value(reply).map_err(|e| GatewayError::Malformed {
            command: C::NAME,
            detail: e.to_string(),
        })
    }
}
