//! Future returned by every message-bus request.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::BusError;

pub(crate) type Outcome = Result<Value, BusError>;

enum State {
    /// Settled before anything was sent (validation / not connected), or a
    /// no-op such as a repeated ack.
    Ready(Option<Outcome>),
    /// Waiting for the response frame.
    Waiting(oneshot::Receiver<Outcome>),
    /// The handler was dropped without answering (handler table cleared).
    /// Stays pending forever.
    Orphaned,
}

/// Resolves with the JSON-RPC `result` or fails with the server's `error`.
///
/// The request frame has already been written when this value is returned;
/// dropping it does not cancel anything. There is no timeout: a request
/// whose response never arrives, or whose handler was discarded by
/// [`crate::MessageBusConnection::on_error`], stays pending.
pub struct ResponseFuture {
    state: State,
}

impl ResponseFuture {
    pub(crate) fn failed(error: BusError) -> Self {
        Self {
            state: State::Ready(Some(Err(error))),
        }
    }

    pub(crate) fn resolved(value: Value) -> Self {
        Self {
            state: State::Ready(Some(Ok(value))),
        }
    }

    pub(crate) fn waiting(rx: oneshot::Receiver<Outcome>) -> Self {
        Self {
            state: State::Waiting(rx),
        }
    }

    /// Whether the future settled without reaching the server.
    pub fn is_settled_locally(&self) -> bool {
        matches!(self.state, State::Ready(Some(_)))
    }
}

impl Future for ResponseFuture {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Ready(outcome) => match outcome.take() {
                Some(outcome) => Poll::Ready(outcome),
                None => Poll::Pending,
            },
            State::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => {
                    this.state = State::Ready(None);
                    Poll::Ready(outcome)
                }
                Poll::Ready(Err(_)) => {
                    this.state = State::Orphaned;
                    Poll::Pending
                }
                Poll::Pending => Poll::Pending,
            },
            State::Orphaned => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Ready(_) => "ready",
            State::Waiting(_) => "waiting",
            State::Orphaned => "orphaned",
        };
        f.debug_struct("ResponseFuture").field("state", &state).finish()
    }
}
