//! Broker state: the in-memory frontend plus the replication backlog.
//!
//! One lock covers the backend, the pending backlog, and the awaiting-ack
//! holding area, so dispatch and backlog capture are a single critical
//! section per request: every backend mutation inside one broker process is
//! serialized, and the backlog records operations in exactly the order they
//! were applied.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{self, Envelope, Operation};
use crate::queue::{dispatch, DispatchError, MemoryBackend};

/// A pending backlog handed off to the replicator, identified by the
/// content signature of its serialized form.
pub struct BacklogSnapshot {
    pub signature: String,
    /// The serialized operation list, byte for byte what goes on the wire.
    pub payload: Vec<u8>,
}

struct State {
    backend: MemoryBackend,
    pending: Vec<Operation>,
    awaiting_ack: HashMap<String, Vec<Operation>>,
}

#[derive(Default)]
pub struct Broker {
    state: Mutex<State>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::new(),
            pending: Vec::new(),
            awaiting_ack: HashMap::new(),
        }
    }
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one envelope against the in-memory backend and return the
    /// reply value. Operations that execute successfully are appended to
    /// the pending backlog before the reply goes out; anything else - an
    /// unknown method, bad arguments, a backend error - answers with the
    /// `false` sentinel and is not recorded.
    pub fn dispatch(&self, envelope: Envelope) -> Value {
        let mut state = self.state.lock();
        match dispatch(&state.backend, &envelope) {
            Ok(reply) => {
                state.pending.push(envelope);
                reply
            }
            Err(DispatchError::UnknownOperation(method)) => {
                warn!(method = %method, "unknown operation");
                Value::Bool(false)
            }
            Err(err) => {
                warn!(method = %envelope.method(), error = %err, "operation not dispatched");
                Value::Bool(false)
            }
        }
    }

    /// Swap out the pending backlog for replication. The snapshot moves
    /// into the holding area under its signature and stays there until
    /// acknowledged - never re-sent on its own, never discarded
    /// speculatively. Returns None when nothing is pending.
    pub fn take_backlog(&self) -> Option<BacklogSnapshot> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return None;
        }

        let operations = std::mem::take(&mut state.pending);
        let payload = match protocol::encode(&operations) {
            Ok(payload) => payload,
            Err(err) => {
                // Leave the backlog in place for the next pull.
                warn!(error = %err, "backlog serialization failed");
                state.pending = operations;
                return None;
            }
        };

        let signature = blake3::hash(&payload).to_hex().to_string();
        debug!(operations = operations.len(), signature = %signature, "backlog handed off");
        state.awaiting_ack.insert(signature.clone(), operations);
        Some(BacklogSnapshot { signature, payload })
    }

    /// Acknowledge a held snapshot by signature. Idempotent and
    /// order-independent: an unmatched signature changes nothing.
    pub fn ack(&self, signature: &str) -> bool {
        let matched = self.state.lock().awaiting_ack.remove(signature).is_some();
        if matched {
            debug!(signature = %signature, "backlog acknowledged");
        } else {
            debug!(signature = %signature, "stale or unknown ack ignored");
        }
        matched
    }

    /// Operations applied since the last backlog hand-off.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Snapshots handed off but not yet acknowledged.
    pub fn unacknowledged_len(&self) -> usize {
        self.state.lock().awaiting_ack.len()
    }
}
