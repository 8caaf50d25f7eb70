//! Message-bus error types.

use serde_json::Value;
use thiserror::Error;

/// Everything a message-bus operation can fail with.
#[derive(Debug, Error)]
pub enum BusError {
    /// A required argument was empty or missing. Nothing was sent.
    #[error("{0}")]
    MissingArgument(&'static str),

    /// The socket is absent or not in the `Open` state. Nothing was sent.
    #[error("WebSocket connection not open")]
    NotConnected,

    /// The server answered with a JSON-RPC `error`, passed through verbatim.
    #[error("message bus returned an error: {0}")]
    Rpc(Value),

    /// An inbound frame was not valid JSON.
    #[error("Invalid JSON in message")]
    InvalidJson(#[source] serde_json::Error),

    /// An outbound envelope could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// The transport refused the frame.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Opening the socket failed.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Underlying cause.
        reason: String,
    },
}

impl BusError {
    /// The server's error payload, for [`BusError::Rpc`].
    pub fn rpc_payload(&self) -> Option<&Value> {
        match self {
            Self::Rpc(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Failures reported by a [`crate::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket's write side is gone.
    #[error("transport closed")]
    Closed,
    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}
