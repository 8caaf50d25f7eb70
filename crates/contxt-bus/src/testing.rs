//! In-memory [`Transport`] that records outgoing frames.
//!
//! Used by this crate's tests and available to downstream crates that want
//! to exercise code built on [`crate::MessageBusConnection`] without a socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::errors::TransportError;
use crate::transport::{ReadyState, Transport};
use crate::types::BusMethod;

/// Records every frame passed to [`Transport::send`].
#[derive(Debug)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    state: Mutex<ReadyState>,
    closes: AtomicUsize,
}

impl RecordingTransport {
    /// A transport in the `Open` state.
    pub fn open() -> Arc<Self> {
        Self::with_state(ReadyState::Open)
    }

    /// A transport in the given state.
    pub fn with_state(state: ReadyState) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            state: Mutex::new(state),
            closes: AtomicUsize::new(0),
        })
    }

    /// Change the reported state.
    pub fn set_state(&self, state: ReadyState) {
        *self.state.lock() = state;
    }

    /// Raw frames sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Frames sent so far, parsed as JSON. Unparseable frames are skipped.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Parsed frames whose `method` is `method`.
    pub fn frames_for(&self, method: BusMethod) -> Vec<Value> {
        self.sent_json()
            .into_iter()
            .filter(|frame| frame["method"] == method.as_str())
            .collect()
    }

    /// The most recent frame, parsed.
    pub fn last_json(&self) -> Option<Value> {
        self.sent_json().pop()
    }

    /// How many times [`Transport::close`] was called.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Transport for RecordingTransport {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        self.sent.lock().push(frame);
        Ok(())
    }

    fn close(&self) {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = ReadyState::Closed;
    }

    fn ready_state(&self) -> ReadyState {
        *self.state.lock()
    }
}
