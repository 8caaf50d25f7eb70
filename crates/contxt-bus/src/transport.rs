//! Socket seam between [`crate::MessageBusConnection`] and the network.

use crate::errors::TransportError;

/// Lifecycle state of the underlying socket, mirroring the WebSocket
/// `readyState` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting = 0,
    /// Frames may be sent.
    Open = 1,
    /// A close has been requested.
    Closing = 2,
    /// The socket is gone.
    Closed = 3,
}

impl ReadyState {
    /// Decode the `repr(u8)` value; anything unknown is `Closed`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// An already-established socket carrying text frames.
///
/// Inbound frames are not part of this trait: whoever owns the read side
/// feeds them to [`crate::MessageBusConnection::on_message`] and reports
/// failures through [`crate::MessageBusConnection::on_error`].
pub trait Transport: Send + Sync {
    /// Queue one text frame for sending.
    fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Begin closing the socket.
    fn close(&self);

    /// Current socket state.
    fn ready_state(&self) -> ReadyState;
}
