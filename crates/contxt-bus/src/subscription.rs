//! Subscription request and the user-facing handler traits.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::ack::Ack;

/// Error type returned by a [`MessageHandler`].
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives the bodies of pushed messages.
///
/// When `handle` returns `Ok`, the message is acknowledged (unless the
/// handler already did so through `ack`). When it returns `Err` or panics,
/// no automatic acknowledgement is sent.
///
/// Implemented for any `Fn(Value, Ack) -> impl Future<Output = Result<(), HandlerError>>`.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Process one message.
    async fn handle(&self, body: Value, ack: Ack) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Value, Ack) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, body: Value, ack: Ack) -> Result<(), HandlerError> {
        (self)(body, ack).await
    }
}

/// Receives subscription-level errors pushed by the server.
pub trait ErrorHandler: Send + Sync + 'static {
    /// Handle one error payload.
    fn handle_error(&self, error: Value);
}

impl<F> ErrorHandler for F
where
    F: Fn(Value) + Send + Sync + 'static,
{
    fn handle_error(&self, error: Value) {
        (self)(error);
    }
}

/// Parameters of a `MessageBus.Subscribe` call.
///
/// ```ignore
/// let request = Subscribe::new("svc-1", "feed:1")
///     .group("workers")
///     .on_message(|body, _ack| async move { println!("{body}"); Ok(()) })
///     .on_error(|err| eprintln!("{err}"));
/// connection.subscribe(request).await?;
/// ```
#[derive(Clone)]
pub struct Subscribe {
    pub(crate) service_client_id: String,
    pub(crate) channel: String,
    pub(crate) group: Option<String>,
    pub(crate) handler: Option<Arc<dyn MessageHandler>>,
    pub(crate) error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl Subscribe {
    /// Start a subscription request for `channel` on behalf of a service client.
    pub fn new(service_client_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            service_client_id: service_client_id.into(),
            channel: channel.into(),
            group: None,
            handler: None,
            error_handler: None,
        }
    }

    /// Join a consumer group. An empty group is the same as none.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into()).filter(|g| !g.is_empty());
        self
    }

    /// Set the message handler.
    #[must_use]
    pub fn on_message(mut self, handler: impl MessageHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Set the error handler.
    #[must_use]
    pub fn on_error(mut self, handler: impl ErrorHandler) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// First missing required field, as a user-facing message.
    pub(crate) fn missing_field(&self) -> Option<&'static str> {
        if self.service_client_id.is_empty() {
            Some("A service client ID is required for subscribing")
        } else if self.channel.is_empty() {
            Some("A channel is required for subscribing")
        } else if self.handler.is_none() {
            Some("A message handler is required for subscribing")
        } else if self.error_handler.is_none() {
            Some("An error handler is required for subscribing")
        } else {
            None
        }
    }

    /// `params` object for the request; `group` is omitted when unset.
    pub(crate) fn params(&self) -> Value {
        let mut params = serde_json::json!({
            "service_id": self.service_client_id,
            "channel": self.channel,
        });
        if let Some(group) = &self.group {
            params["group"] = Value::String(group.clone());
        }
        params
    }
}

impl std::fmt::Debug for Subscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribe")
            .field("service_client_id", &self.service_client_id)
            .field("channel", &self.channel)
            .field("group", &self.group)
            .field("handler", &self.handler.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}
