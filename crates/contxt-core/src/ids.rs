//! Branded ID newtypes and correlation-id generation.
//!
//! Every id that crosses the message-bus wire is a distinct newtype over
//! `String`, so a subscription id cannot be passed where an acknowledgement
//! message id is expected.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Client-generated id placed in the JSON-RPC `id` field of a request.
    CorrelationId
}

branded_id! {
    /// Server-assigned id returned by a successful `MessageBus.Subscribe`.
    SubscriptionId
}

branded_id! {
    /// Id of a pushed message, used to acknowledge it.
    MessageId
}

branded_id! {
    /// Organization whose message-bus stream a connection is bound to.
    OrganizationId
}

/// Source of correlation ids for outgoing requests.
pub trait IdGenerator: Send + Sync {
    /// Produce an id that has not been handed out before.
    fn next_id(&self) -> CorrelationId;
}

/// Default generator: UUID v7 (time-ordered).
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> CorrelationId {
        CorrelationId(Uuid::now_v7().to_string())
    }
}

/// Deterministic generator producing `<prefix>-1`, `<prefix>-2`, ...
///
/// Useful wherever frames need to be predicted, e.g. in tests.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    /// Create a generator with the given prefix, starting at 1.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> CorrelationId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        CorrelationId(format!("{}-{n}", self.prefix))
    }
}
