//! relayq - priority and delay aware work queue.
//!
//! This library exposes the queue core (scoring, backends, durable store
//! abstraction), the broker wire protocol, the broker server, the remote
//! client stub, and the backlog replicator.

pub mod client;
pub mod protocol;
pub mod queue;
pub mod replicator;
pub mod server;
pub mod shutdown;
pub mod telemetry;
