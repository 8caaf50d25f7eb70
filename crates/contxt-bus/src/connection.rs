//! JSON-RPC request/response correlation over one message-bus socket.
//!
//! Every request gets a fresh correlation id and a one-shot entry in the
//! handler table; the matching response removes the entry and settles the
//! caller's [`ResponseFuture`]. A successful subscribe adds a persistent
//! entry keyed by the server's subscription id, which receives every push
//! for that subscription until the table is cleared.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use contxt_core::{IdGenerator, MessageId, SubscriptionId, UuidGenerator};
use futures::FutureExt;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::ack::Ack;
use crate::errors::BusError;
use crate::handlers::{HandlerKind, HandlerTable, SubscriptionFn};
use crate::response::ResponseFuture;
use crate::subscription::{ErrorHandler, MessageHandler, Subscribe};
use crate::transport::{ReadyState, Transport};
use crate::types::{BusMethod, InboundMessage, JsonRpcRequest, Push, is_falsy};

struct Inner {
    /// Log label for this connection.
    conn_id: String,
    transport: Option<Arc<dyn Transport>>,
    handlers: HandlerTable,
    ids: Arc<dyn IdGenerator>,
}

/// A message-bus client bound to one socket.
///
/// Cheap to clone; clones share the socket and the handler table.
#[derive(Clone)]
pub struct MessageBusConnection {
    inner: Arc<Inner>,
}

impl MessageBusConnection {
    /// Wrap an established transport. `None` models a dead connection on
    /// which every operation fails with [`BusError::NotConnected`].
    pub fn new(transport: Option<Arc<dyn Transport>>) -> Self {
        Self::with_id_generator(transport, Arc::new(UuidGenerator))
    }

    /// Like [`Self::new`] with a custom correlation-id source.
    pub fn with_id_generator(
        transport: Option<Arc<dyn Transport>>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                conn_id: UuidGenerator.next_id().into_inner(),
                transport,
                handlers: HandlerTable::default(),
                ids,
            }),
        }
    }

    /// Log label of this connection.
    pub fn id(&self) -> &str {
        &self.inner.conn_id
    }

    /// `true` iff a transport is present and reports [`ReadyState::Open`].
    pub fn is_connected(&self) -> bool {
        self.inner
            .transport
            .as_ref()
            .is_some_and(|t| t.ready_state() == ReadyState::Open)
    }

    /// Number of outstanding requests plus live subscriptions.
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    /// Whether a subscription handler is registered under `id`.
    pub fn has_subscription(&self, id: &SubscriptionId) -> bool {
        self.inner.handlers.contains(id.as_str())
    }

    // ── Operations ──────────────────────────────────────────────────────

    /// Authorize the socket with an API token (`MessageBus.Authorize`).
    pub fn authorize(&self, token: &str) -> ResponseFuture {
        if token.is_empty() {
            return ResponseFuture::failed(BusError::MissingArgument(
                "A token is required for authorization",
            ));
        }
        if !self.is_connected() {
            return ResponseFuture::failed(BusError::NotConnected);
        }
        self.request(BusMethod::Authorize, json!({ "token": token }))
    }

    /// Publish `message` to `channel` (`MessageBus.Publish`).
    ///
    /// A falsy message (`null`, `false`, `0`, `""`) counts as missing.
    pub fn publish(&self, service_client_id: &str, channel: &str, message: Value) -> ResponseFuture {
        let missing = if service_client_id.is_empty() {
            Some("A service client ID is required for publishing")
        } else if channel.is_empty() {
            Some("A channel is required for publishing")
        } else if is_falsy(&message) {
            Some("A message is required for publishing")
        } else {
            None
        };
        if let Some(text) = missing {
            return ResponseFuture::failed(BusError::MissingArgument(text));
        }
        if !self.is_connected() {
            return ResponseFuture::failed(BusError::NotConnected);
        }
        self.request(
            BusMethod::Publish,
            json!({
                "service_id": service_client_id,
                "channel": channel,
                "message": message,
            }),
        )
    }

    /// Subscribe to a channel (`MessageBus.Subscribe`).
    ///
    /// Resolves with the server's result (`{"subscription": <id>}`). The
    /// subscription handler is registered before the future resolves, so
    /// pushes arriving right after the response are not lost.
    pub fn subscribe(&self, request: Subscribe) -> ResponseFuture {
        if let Some(text) = request.missing_field() {
            return ResponseFuture::failed(BusError::MissingArgument(text));
        }
        if !self.is_connected() {
            return ResponseFuture::failed(BusError::NotConnected);
        }
        let (Some(handler), Some(error_handler)) =
            (request.handler.clone(), request.error_handler.clone())
        else {
            return ResponseFuture::failed(BusError::MissingArgument(
                "A message handler is required for subscribing",
            ));
        };

        let weak = Arc::downgrade(&self.inner);
        self.request_with(BusMethod::Subscribe, request.params(), move |result| {
            let Some(subscription_id) = subscription_id(result) else {
                warn!(?result, "subscribe response carried no subscription id");
                return;
            };
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let connection = MessageBusConnection { inner };
            connection.register_subscription(subscription_id, handler, error_handler);
        })
    }

    /// Close the underlying socket. Outstanding requests are left as they are.
    pub fn close(&self) {
        if let Some(transport) = &self.inner.transport {
            debug!(conn_id = %self.inner.conn_id, "closing message bus connection");
            transport.close();
        }
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    /// Route one inbound text frame.
    ///
    /// Fails only when the frame is not JSON. Frames without a known id are
    /// dropped.
    pub fn on_message(&self, text: &str) -> Result<(), BusError> {
        let value: Value = serde_json::from_str(text).map_err(BusError::InvalidJson)?;
        let Ok(message) = serde_json::from_value::<InboundMessage>(value) else {
            trace!(conn_id = %self.inner.conn_id, "dropping non-object frame");
            return Ok(());
        };
        let Some(key) = message.key() else {
            trace!(conn_id = %self.inner.conn_id, "dropping frame without id");
            return Ok(());
        };

        match self.inner.handlers.take_for_dispatch(&key) {
            Some(HandlerKind::OneShot(handler)) => {
                trace!(conn_id = %self.inner.conn_id, correlation_id = %key, "response");
                handler(message);
            }
            Some(HandlerKind::Subscription(handler)) => {
                trace!(conn_id = %self.inner.conn_id, subscription_id = %key, "push");
                handler(message);
            }
            None => {
                trace!(conn_id = %self.inner.conn_id, id = %key, "no handler for frame");
            }
        }
        Ok(())
    }

    /// Socket failure: drop every handler and log.
    ///
    /// Futures awaiting the dropped handlers never resolve, and
    /// subscriptions are not re-established.
    pub fn on_error(&self, err: &dyn fmt::Display) {
        let dropped = self.inner.handlers.clear();
        error!(
            conn_id = %self.inner.conn_id,
            dropped,
            error = %err,
            "message bus socket error, dropped all handlers"
        );
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// `MessageBus.Acknowledge` for one pushed message.
    pub(crate) fn acknowledge(&self, message_id: &MessageId) -> ResponseFuture {
        if !self.is_connected() {
            return ResponseFuture::failed(BusError::NotConnected);
        }
        self.request(BusMethod::Acknowledge, json!({ "message_id": message_id }))
    }

    fn request(&self, method: BusMethod, params: Value) -> ResponseFuture {
        self.request_with(method, params, |_| {})
    }

    /// Register a one-shot handler under a fresh correlation id, then send.
    ///
    /// `on_result` runs with the `result` of a successful response before
    /// the caller's future is settled.
    fn request_with<F>(&self, method: BusMethod, params: Value, on_result: F) -> ResponseFuture
    where
        F: FnOnce(&Value) + Send + 'static,
    {
        let Some(transport) = self.inner.transport.clone() else {
            return ResponseFuture::failed(BusError::NotConnected);
        };

        let id = self.inner.ids.next_id();
        let (tx, rx) = oneshot::channel();
        self.inner.handlers.insert_one_shot(
            id.to_string(),
            Box::new(move |message: InboundMessage| {
                let outcome = match message.error {
                    Some(err) => Err(BusError::Rpc(err)),
                    None => {
                        let result = message.result.unwrap_or(Value::Null);
                        on_result(&result);
                        Ok(result)
                    }
                };
                let _ = tx.send(outcome);
            }),
        );

        let frame = match serde_json::to_string(&JsonRpcRequest::new(method, params, id.clone())) {
            Ok(frame) => frame,
            Err(err) => {
                let _ = self.inner.handlers.remove(id.as_str());
                return ResponseFuture::failed(BusError::Encode(err));
            }
        };
        if let Err(err) = transport.send(frame) {
            let _ = self.inner.handlers.remove(id.as_str());
            return ResponseFuture::failed(err.into());
        }

        debug!(
            conn_id = %self.inner.conn_id,
            method = method.as_str(),
            correlation_id = %id,
            "sent request"
        );
        ResponseFuture::waiting(rx)
    }

    /// Register the push handler for a new subscription.
    ///
    /// Pushes are queued in arrival order and drained by one task per
    /// subscription, so the user's handlers see them in that order and never
    /// run concurrently with each other.
    fn register_subscription(
        &self,
        subscription_id: SubscriptionId,
        handler: Arc<dyn MessageHandler>,
        error_handler: Arc<dyn ErrorHandler>,
    ) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(
                conn_id = %self.inner.conn_id,
                subscription_id = %subscription_id,
                "no tokio runtime to run subscription handlers, not registering"
            );
            return;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        drop(runtime.spawn(drain_pushes(
            Arc::downgrade(&self.inner),
            subscription_id.clone(),
            rx,
            handler,
            error_handler,
        )));

        let conn_id = self.inner.conn_id.clone();
        let key = subscription_id.clone();
        let on_push: SubscriptionFn = Arc::new(move |message: InboundMessage| {
            let result = message.result.unwrap_or(Value::Null);
            let Some(push) = Push::from_result(&result) else {
                warn!(
                    conn_id = %conn_id,
                    subscription_id = %key,
                    "push without message id, dropping"
                );
                return;
            };
            let _ = tx.send(push);
        });

        debug!(
            conn_id = %self.inner.conn_id,
            subscription_id = %subscription_id,
            "subscription registered"
        );
        self.inner
            .handlers
            .insert_subscription(subscription_id.into_inner(), on_push);
    }
}

/// Run a subscription's handlers over its queued pushes, one at a time.
///
/// Ends once the subscription's entry is dropped from the handler table (or
/// the connection itself is gone) and the queue is drained. A message is
/// acked after its handler returns `Ok`.
async fn drain_pushes(
    inner: Weak<Inner>,
    subscription_id: SubscriptionId,
    mut rx: mpsc::UnboundedReceiver<Push>,
    handler: Arc<dyn MessageHandler>,
    error_handler: Arc<dyn ErrorHandler>,
) {
    while let Some(push) = rx.recv().await {
        let (message_id, body) = match push {
            Push::Error(err) => {
                let handled =
                    std::panic::catch_unwind(AssertUnwindSafe(|| error_handler.handle_error(err)));
                if handled.is_err() {
                    error!(subscription_id = %subscription_id, "error handler panicked");
                }
                continue;
            }
            Push::Message { id, body } => (MessageId::from(id), body),
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let ack = Ack::new(message_id, MessageBusConnection { inner });
        let outcome = AssertUnwindSafe(handler.handle(body, ack.clone()))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {
                let _ = ack.ack();
            }
            Ok(Err(err)) => {
                warn!(
                    subscription_id = %subscription_id,
                    message_id = %ack.message_id(),
                    error = %err,
                    "message handler failed"
                );
            }
            Err(_) => {
                error!(
                    subscription_id = %subscription_id,
                    message_id = %ack.message_id(),
                    "message handler panicked"
                );
            }
        }
    }
    trace!(subscription_id = %subscription_id, "subscription queue closed");
}

impl fmt::Debug for MessageBusConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBusConnection")
            .field("id", &self.inner.conn_id)
            .field("connected", &self.is_connected())
            .field("handlers", &self.inner.handlers.len())
            .finish()
    }
}

fn subscription_id(result: &Value) -> Option<SubscriptionId> {
    match result.get("subscription")? {
        Value::String(s) if !s.is_empty() => Some(SubscriptionId::from(s.as_str())),
        Value::Number(n) => Some(SubscriptionId::from(n.to_string())),
        _ => None,
    }
}
