//! The durable store collaborator contract.
//!
//! The durable engine needs five primitive groups from its store: plain
//! get/set/delete, an atomic counter, set membership, and a sorted index
//! with insert, compare-and-delete, range queries, and cardinality. Any
//! store offering these satisfies the contract; [`MemoryStore`] is the
//! in-process implementation and `RedisStore` (behind the `redis` feature)
//! is the networked one.

use thiserror::Error;

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Delete a key of any kind. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically increment a counter and return the new value.
    fn incr(&self, key: &str) -> Result<u64, StoreError>;

    fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;
    fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Insert a member at a score, replacing any previous score.
    fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError>;

    /// Delete a member. The boolean return is the compare-and-delete
    /// primitive the optimistic remove protocol rests on: false means
    /// someone else already took the member.
    fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Members with score <= max, ascending, with offset and limit.
    fn zrange_by_score(
        &self,
        key: &str,
        max: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Members by ascending rank, with offset and limit.
    fn zrange(&self, key: &str, offset: usize, limit: usize) -> Result<Vec<String>, StoreError>;

    fn zcard(&self, key: &str) -> Result<u64, StoreError>;
}
