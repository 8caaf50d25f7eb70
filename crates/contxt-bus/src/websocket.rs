//! [`Transport`] over `tokio-tungstenite`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use contxt_core::{IdGenerator, UuidGenerator};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::connection::MessageBusConnection;
use crate::errors::{BusError, TransportError};
use crate::transport::{ReadyState, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a message-bus socket.
///
/// Frames are queued on an unbounded channel drained by a writer task, so
/// [`Transport::send`] never blocks. The read half lives in a reader task
/// that feeds the owning [`MessageBusConnection`].
#[derive(Debug)]
pub struct WebSocketTransport {
    tx: mpsc::UnboundedSender<Message>,
    state: Arc<AtomicU8>,
}

impl WebSocketTransport {
    fn set_state(&self, state: ReadyState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Transport for WebSocketTransport {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        if self.ready_state() != ReadyState::Open {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(Message::Text(frame.into()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        if self.ready_state() == ReadyState::Open {
            self.set_state(ReadyState::Closing);
            let _ = self.tx.send(Message::Close(None));
        }
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Open a socket to `url` and wrap it in a [`MessageBusConnection`].
///
/// When `token` is set it is sent as `Authorization: Bearer <token>` on the
/// upgrade request. The message-bus protocol still expects an explicit
/// [`MessageBusConnection::authorize`] afterwards.
pub async fn connect(url: &str, token: Option<&str>) -> Result<MessageBusConnection, BusError> {
    connect_with_id_generator(url, token, Arc::new(UuidGenerator)).await
}

/// Like [`connect`] with a custom correlation-id source.
pub async fn connect_with_id_generator(
    url: &str,
    token: Option<&str>,
    ids: Arc<dyn IdGenerator>,
) -> Result<MessageBusConnection, BusError> {
    let connect_err = |reason: String| BusError::Connect {
        url: url.to_owned(),
        reason,
    };

    let mut request = url
        .into_client_request()
        .map_err(|e| connect_err(e.to_string()))?;
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| connect_err(format!("invalid token: {e}")))?;
        let _ = request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (ws, _response) = connect_async(request)
        .await
        .map_err(|e| connect_err(e.to_string()))?;
    info!(url, "message bus socket open");

    let (sink, stream) = ws.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(AtomicU8::new(ReadyState::Open as u8));
    let transport = Arc::new(WebSocketTransport {
        tx,
        state: Arc::clone(&state),
    });

    let connection = MessageBusConnection::with_id_generator(Some(transport), ids);
    drop(tokio::spawn(write_loop(sink, rx, Arc::clone(&state))));
    drop(tokio::spawn(read_loop(stream, connection.clone(), state)));
    Ok(connection)
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    state: Arc<AtomicU8>,
) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(err) = sink.send(message).await {
            warn!(error = %err, "message bus write failed");
            state.store(ReadyState::Closed as u8, Ordering::Release);
            break;
        }
        if closing {
            break;
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    connection: MessageBusConnection,
    state: Arc<AtomicU8>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Err(err) = connection.on_message(text.as_str()) {
                    warn!(conn_id = connection.id(), error = %err, "malformed frame");
                }
            }
            Ok(Message::Close(_)) => {
                state.store(ReadyState::Closed as u8, Ordering::Release);
                debug!(conn_id = connection.id(), "message bus socket closed");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                state.store(ReadyState::Closed as u8, Ordering::Release);
                connection.on_error(&err);
                return;
            }
        }
    }
    state.store(ReadyState::Closed as u8, Ordering::Release);
    connection.on_error(&"stream ended without a close frame");
}
