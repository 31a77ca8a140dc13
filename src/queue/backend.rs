//! The operation surface shared by every storage engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{Disposition, QueueError};
use super::metadata::Metadata;

/// A queued payload with its metadata.
///
/// Serialized as the `[item, metadata]` pair - the shape every engine
/// stores and the broker ships over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem(pub Value, pub Metadata);

impl QueueItem {
    pub fn item(&self) -> &Value {
        &self.0
    }

    pub fn metadata(&self) -> &Metadata {
        &self.1
    }
}

/// Validate the metadata argument of `add`: only a mapping is accepted.
pub fn require_mapping(metadata: Value) -> Result<Metadata, QueueError> {
    match metadata {
        Value::Object(map) => Ok(map),
        other => Err(QueueError::InvalidMetadata(json_type_name(&other))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

/// A storage engine for named queues.
///
/// All engines share the eligibility rule: only the entry with the lowest
/// score is ever inspected, and it is invisible while its score is still in
/// the future.
pub trait Backend {
    /// Add an item. Returns the key assigned to it, unique within the queue
    /// for as long as the entry is live.
    fn add(&self, queue: &str, item: Value, metadata: Value) -> Result<u64, QueueError>;

    /// Add many items with empty metadata. Best effort: a failure mid-batch
    /// may leave a prefix of the batch applied.
    fn add_bulk(&self, queue: &str, items: Vec<Value>) -> Result<(), QueueError>;

    /// Destructively pop the earliest eligible entry, or None when the
    /// queue is empty or its earliest entry is still in the future.
    fn remove(&self, queue: &str) -> Result<Option<QueueItem>, QueueError>;

    /// Reservation form of [`remove`](Backend::remove): the entry is taken
    /// out of the visible order, the handler runs, and the entry is deleted
    /// or put back according to the handler's [`Disposition`].
    fn reserve<R, F>(&self, queue: &str, handler: F) -> Result<Option<R>, QueueError>
    where
        F: FnOnce(&QueueItem) -> Result<Disposition<R>, QueueError>;

    /// Read the earliest eligible entry without removing it.
    fn peek(&self, queue: &str) -> Result<Option<QueueItem>, QueueError>;

    /// Number of entries in the queue, future entries included.
    fn size(&self, queue: &str) -> Result<u64, QueueError>;

    /// Every entry in ascending score order, eligible or not.
    fn list(&self, queue: &str) -> Result<Vec<QueueItem>, QueueError>;

    /// Delete every entry. The queue name stays registered.
    fn empty(&self, queue: &str) -> Result<(), QueueError>;

    /// Every queue name ever created, drained queues included.
    fn list_queues(&self) -> Result<Vec<String>, QueueError>;

    /// Empty and unregister the given queues; an empty slice means all of
    /// them.
    fn remove_queues(&self, queues: &[String]) -> Result<(), QueueError>;
}
