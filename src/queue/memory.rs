//! In-memory engine: one ordered map per queue, keyed by score.
//!
//! The fast frontend for the broker. Entries live in a `BTreeMap` keyed by
//! `(score, key)` so equal scores fall back to insertion order, and the
//! map's minimum entry is the only one remove/peek ever look at.

use std::collections::{BTreeMap, HashMap};

use compact_str::CompactString;
use parking_lot::Mutex;
use serde_json::Value;

use super::backend::{require_mapping, Backend, QueueItem};
use super::error::{Disposition, QueueError};
use super::metadata::{self, Metadata};

#[derive(Default)]
struct MemoryQueue {
    entries: BTreeMap<(i64, u64), QueueItem>,
    next_key: u64,
}

/// The registry of queues doubles as the queue set: a name stays known
/// after `empty`, and only `remove_queues` forgets it. Writes create a
/// queue implicitly; reads against an unknown name see an empty one.
#[derive(Default)]
pub struct MemoryBackend {
    queues: Mutex<HashMap<CompactString, MemoryQueue>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the minimum entry out of the queue if it is eligible now.
    fn claim_first(&self, queue: &str) -> Option<(u64, QueueItem)> {
        let now = metadata::now_us();
        let mut queues = self.queues.lock();
        let q = queues.get_mut(queue)?;
        let first = q.entries.keys().next().copied()?;
        if first.0 > now {
            // The minimum entry is still in the future; nothing behind it
            // can be eligible either.
            return None;
        }
        q.entries.remove(&first).map(|entry| (first.1, entry))
    }

    /// Put a reserved entry back under its original key, re-scored against
    /// the current clock.
    fn restore(&self, queue: &str, key: u64, entry: QueueItem) {
        let QueueItem(item, entry_metadata) = entry;
        let entry_metadata = metadata::normalize_metadata(entry_metadata);
        let score = metadata::score_from_metadata(&entry_metadata);
        self.queues
            .lock()
            .entry(CompactString::from(queue))
            .or_default()
            .entries
            .insert((score, key), QueueItem(item, entry_metadata));
    }
}

impl Backend for MemoryBackend {
    fn add(&self, queue: &str, item: Value, metadata: Value) -> Result<u64, QueueError> {
        let entry_metadata = metadata::normalize_metadata(require_mapping(metadata)?);
        let score = metadata::score_from_metadata(&entry_metadata);

        let mut queues = self.queues.lock();
        let q = queues.entry(CompactString::from(queue)).or_default();
        q.next_key += 1;
        q.entries
            .insert((score, q.next_key), QueueItem(item, entry_metadata));
        Ok(q.next_key)
    }

    fn add_bulk(&self, queue: &str, items: Vec<Value>) -> Result<(), QueueError> {
        let mut queues = self.queues.lock();
        let q = queues.entry(CompactString::from(queue)).or_default();
        for item in items {
            let entry_metadata = Metadata::new();
            let score = metadata::score_from_metadata(&entry_metadata);
            q.next_key += 1;
            q.entries
                .insert((score, q.next_key), QueueItem(item, entry_metadata));
        }
        Ok(())
    }

    fn remove(&self, queue: &str) -> Result<Option<QueueItem>, QueueError> {
        Ok(self.claim_first(queue).map(|(_, entry)| entry))
    }

    fn reserve<R, F>(&self, queue: &str, handler: F) -> Result<Option<R>, QueueError>
    where
        F: FnOnce(&QueueItem) -> Result<Disposition<R>, QueueError>,
    {
        let Some((key, entry)) = self.claim_first(queue) else {
            return Ok(None);
        };

        match handler(&entry) {
            Ok(Disposition::Commit(result)) => Ok(Some(result)),
            Ok(Disposition::Abort) => {
                self.restore(queue, key, entry);
                Ok(None)
            }
            Err(err) => {
                self.restore(queue, key, entry);
                Err(err)
            }
        }
    }

    fn peek(&self, queue: &str) -> Result<Option<QueueItem>, QueueError> {
        let now = metadata::now_us();
        let queues = self.queues.lock();
        let Some(q) = queues.get(queue) else {
            return Ok(None);
        };
        match q.entries.iter().next() {
            Some((&(score, _), _)) if score > now => Ok(None),
            Some((_, entry)) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    fn size(&self, queue: &str) -> Result<u64, QueueError> {
        Ok(self
            .queues
            .lock()
            .get(queue)
            .map(|q| q.entries.len() as u64)
            .unwrap_or(0))
    }

    fn list(&self, queue: &str) -> Result<Vec<QueueItem>, QueueError> {
        Ok(self
            .queues
            .lock()
            .get(queue)
            .map(|q| q.entries.values().cloned().collect())
            .unwrap_or_default())
    }

    fn empty(&self, queue: &str) -> Result<(), QueueError> {
        self.queues
            .lock()
            .entry(CompactString::from(queue))
            .or_default()
            .entries
            .clear();
        Ok(())
    }

    fn list_queues(&self) -> Result<Vec<String>, QueueError> {
        Ok(self
            .queues
            .lock()
            .keys()
            .map(|name| name.to_string())
            .collect())
    }

    fn remove_queues(&self, queues: &[String]) -> Result<(), QueueError> {
        let mut registry = self.queues.lock();
        if queues.is_empty() {
            registry.clear();
        } else {
            for queue in queues {
                registry.remove(queue.as_str());
            }
        }
        Ok(())
    }
}
