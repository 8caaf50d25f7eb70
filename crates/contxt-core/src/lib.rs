//! # contxt-core
//!
//! Shared vocabulary for the contxt message-bus client crates:
//!
//! - **Branded IDs**: `CorrelationId`, `SubscriptionId`, `MessageId`,
//!   `OrganizationId` as newtypes over `String`
//! - **ID generation**: the [`ids::IdGenerator`] seam used to mint
//!   correlation ids for outgoing JSON-RPC requests
//! - **Logging**: `tracing` subscriber setup and in-memory log capture for tests

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;

pub use ids::{
    CorrelationId, IdGenerator, MessageId, OrganizationId, SequentialIdGenerator, SubscriptionId,
    UuidGenerator,
};
