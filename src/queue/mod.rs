//! Queue core - scoring, engines, and the durable store abstraction.
//!
//! ## Module organization
//!
//! - `metadata.rs` - scheduling metadata normalization and scoring
//! - `backend.rs` - the `Backend` trait shared by every engine
//! - `memory.rs` - ordered-map in-memory engine (the broker frontend)
//! - `durable.rs` - KV + sorted-index engine with optimistic remove
//! - `store/` - the durable store collaborator contract and its impls
//! - `dispatch.rs` - the closed operation-name dispatch table

pub mod backend;
pub mod dispatch;
pub mod durable;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod store;

#[cfg(test)]
mod tests;

pub use backend::{Backend, QueueItem};
pub use dispatch::{dispatch, DispatchError};
pub use durable::DurableBackend;
pub use error::{Disposition, QueueError};
pub use memory::MemoryBackend;
pub use metadata::Metadata;
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::{MemoryStore, Store, StoreError};
