//! # contxt-bus
//!
//! Client for the contxt message bus: JSON-RPC 2.0 over a single WebSocket.
//!
//! - [`MessageBusConnection`]: `authorize`, `publish`, `subscribe` and
//!   per-message acknowledgement over one socket
//! - [`Transport`]: the socket seam; [`websocket`] provides the
//!   `tokio-tungstenite` implementation
//! - [`MessageBus`]: one cached connection per organization
//!
//! Requests are written to the socket when the operation is called, not when
//! the returned [`ResponseFuture`] is first polled. No request ever times out;
//! wrap the future in `tokio::time::timeout` to bound the wait.

#![deny(unsafe_code)]

pub mod ack;
pub mod bus;
pub mod connection;
pub mod errors;
mod handlers;
pub mod response;
pub mod subscription;
pub mod testing;
pub mod transport;
pub mod types;
pub mod websocket;

pub use ack::Ack;
pub use bus::MessageBus;
pub use connection::MessageBusConnection;
pub use errors::{BusError, TransportError};
pub use response::ResponseFuture;
pub use subscription::{ErrorHandler, HandlerError, MessageHandler, Subscribe};
pub use transport::{ReadyState, Transport};
pub use types::BusMethod;
