//! Run-once acknowledgement handle for a pushed message.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use contxt_core::MessageId;
use serde_json::Value;

use crate::connection::MessageBusConnection;
use crate::response::ResponseFuture;

/// Acknowledges one delivered message.
///
/// Clones share one `acked` flag: once any clone has sent
/// `MessageBus.Acknowledge`, later calls resolve to `null` without touching
/// the socket. The subscription machinery holds a clone and
/// acks automatically once the handler returns `Ok`.
#[derive(Clone)]
pub struct Ack {
    message_id: MessageId,
    acked: Arc<AtomicBool>,
    connection: MessageBusConnection,
}

impl Ack {
    pub(crate) fn new(message_id: MessageId, connection: MessageBusConnection) -> Self {
        Self {
            message_id,
            acked: Arc::new(AtomicBool::new(false)),
            connection,
        }
    }

    /// Id of the message this handle acknowledges.
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Whether an acknowledgement frame has been sent.
    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::Acquire)
    }

    /// Acknowledge the message. Idempotent once a frame has been sent.
    ///
    /// The frame is written immediately; awaiting the returned future is
    /// only needed to observe the server's answer. When nothing could be
    /// sent (socket not open), the flag is released again so later calls
    /// report the same failure instead of a silent success.
    pub fn ack(&self) -> ResponseFuture {
        if self.acked.swap(true, Ordering::AcqRel) {
            return ResponseFuture::resolved(Value::Null);
        }
        let outcome = self.connection.acknowledge(&self.message_id);
        if outcome.is_settled_locally() {
            self.acked.store(false, Ordering::Release);
        }
        outcome
    }
}

impl std::fmt::Debug for Ack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ack")
            .field("message_id", &self.message_id)
            .field("acked", &self.is_acked())
            .finish_non_exhaustive()
    }
}
