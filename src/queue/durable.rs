//! Durable engine over a key/value + sorted-index store.
//!
//! Each queue maps to four pieces of store state: an atomic counter for
//! fresh keys, membership in the global queue set, a sorted index of keys
//! by score, and one serialized `[item, metadata]` value per key. Removal
//! is optimistic: claim the earliest eligible key with a compare-and-delete
//! on the index and retry from the top whenever another dequeuer got there
//! first. No locks anywhere.

use std::sync::Arc;

use serde_json::Value;

use super::backend::{require_mapping, Backend, QueueItem};
use super::error::{Disposition, QueueError};
use super::metadata::{self, Metadata};
use super::store::Store;

const NAMESPACE: &str = "relayq:";
const QUEUE_SET: &str = "relayq:queues";
const COUNTER_SUFFIX: &str = ":uuid";
const INDEX_SUFFIX: &str = ":queue";
const VALUE_INFIX: &str = ":values:";

/// Index range scans are O(log N + batch); keep batches bounded so a large
/// queue never turns one call into one giant round trip.
const SCAN_BATCH: usize = 1000;

#[derive(Clone)]
pub struct DurableBackend {
    store: Arc<dyn Store>,
}

impl DurableBackend {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn counter_key(queue: &str) -> String {
        format!("{NAMESPACE}{queue}{COUNTER_SUFFIX}")
    }

    fn index_key(queue: &str) -> String {
        format!("{NAMESPACE}{queue}{INDEX_SUFFIX}")
    }

    fn value_key(queue: &str, key: u64) -> String {
        format!("{NAMESPACE}{queue}{VALUE_INFIX}{key}")
    }

    /// The earliest key whose score has come due, if any.
    fn first_in_queue(&self, queue: &str) -> Result<Option<u64>, QueueError> {
        let members =
            self.store
                .zrange_by_score(&Self::index_key(queue), metadata::now_us(), 0, 1)?;
        Ok(members.first().and_then(|member| member.parse().ok()))
    }

    fn read_value(&self, queue: &str, key: u64) -> Result<Option<QueueItem>, QueueError> {
        match self.store.get(&Self::value_key(queue, key))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write_value(&self, queue: &str, key: u64, entry: &QueueItem) -> Result<(), QueueError> {
        let raw = serde_json::to_string(entry)?;
        self.store.set(&Self::value_key(queue, key), &raw)?;
        Ok(())
    }

    fn index_insert(&self, queue: &str, key: u64, entry_metadata: &Metadata) -> Result<(), QueueError> {
        let score = metadata::score_from_metadata(entry_metadata);
        self.store
            .zadd(&Self::index_key(queue), score, &key.to_string())?;
        Ok(())
    }

    /// Reinsert a reserved entry, re-scored against freshly normalized
    /// metadata rather than its original score.
    fn put_back(&self, queue: &str, key: u64, entry: &QueueItem) -> Result<(), QueueError> {
        let entry_metadata = metadata::normalize_metadata(entry.1.clone());
        self.index_insert(queue, key, &entry_metadata)
    }

    /// Claim the earliest eligible entry. Losing the index delete means a
    /// concurrent dequeuer took the key between our read and our delete;
    /// the loop re-reads fresh state and tries again, however often it
    /// takes.
    fn claim_first(&self, queue: &str) -> Result<Option<(u64, Option<QueueItem>)>, QueueError> {
        loop {
            let Some(key) = self.first_in_queue(queue)? else {
                return Ok(None);
            };
            if !self.store.zrem(&Self::index_key(queue), &key.to_string())? {
                continue;
            }
            return Ok(Some((key, self.read_value(queue, key)?)));
        }
    }
}

impl Backend for DurableBackend {
    fn add(&self, queue: &str, item: Value, metadata: Value) -> Result<u64, QueueError> {
        let entry_metadata = metadata::normalize_metadata(require_mapping(metadata)?);
        let key = self.store.incr(&Self::counter_key(queue))?;
        self.store.set_add(QUEUE_SET, queue)?;

        let entry = QueueItem(item, entry_metadata);
        // The value must be written before the key shows up in the index: a
        // dequeuer that wins the index race reads the value straight away.
        self.write_value(queue, key, &entry)?;
        self.index_insert(queue, key, &entry.1)?;
        Ok(key)
    }

    fn add_bulk(&self, queue: &str, items: Vec<Value>) -> Result<(), QueueError> {
        // Reserve every key up front so interleaved adds cannot slot into
        // the batch's key range.
        let mut keys = Vec::with_capacity(items.len());
        for _ in &items {
            keys.push(self.store.incr(&Self::counter_key(queue))?);
        }
        self.store.set_add(QUEUE_SET, queue)?;

        for (item, key) in items.into_iter().zip(keys) {
            let entry = QueueItem(item, Metadata::new());
            self.write_value(queue, key, &entry)?;
            self.index_insert(queue, key, &entry.1)?;
        }
        Ok(())
    }

    fn remove(&self, queue: &str) -> Result<Option<QueueItem>, QueueError> {
        match self.claim_first(queue)? {
            Some((key, entry)) => {
                self.store.delete(&Self::value_key(queue, key))?;
                Ok(entry)
            }
            None => Ok(None),
        }
    }

    fn reserve<R, F>(&self, queue: &str, handler: F) -> Result<Option<R>, QueueError>
    where
        F: FnOnce(&QueueItem) -> Result<Disposition<R>, QueueError>,
    {
        let Some((key, entry)) = self.claim_first(queue)? else {
            return Ok(None);
        };
        // A missing value means the entry was wiped under us; nothing to
        // reserve.
        let Some(entry) = entry else {
            return Ok(None);
        };

        match handler(&entry) {
            Ok(Disposition::Commit(result)) => {
                self.store.delete(&Self::value_key(queue, key))?;
                Ok(Some(result))
            }
            Ok(Disposition::Abort) => {
                self.put_back(queue, key, &entry)?;
                Ok(None)
            }
            Err(err) => {
                self.put_back(queue, key, &entry)?;
                Err(err)
            }
        }
    }

    fn peek(&self, queue: &str) -> Result<Option<QueueItem>, QueueError> {
        match self.first_in_queue(queue)? {
            Some(key) => self.read_value(queue, key),
            None => Ok(None),
        }
    }

    fn size(&self, queue: &str) -> Result<u64, QueueError> {
        Ok(self.store.zcard(&Self::index_key(queue))?)
    }

    fn list(&self, queue: &str) -> Result<Vec<QueueItem>, QueueError> {
        let index = Self::index_key(queue);
        let mut entries = Vec::new();
        let mut offset = 0;
        loop {
            let members = self.store.zrange(&index, offset, SCAN_BATCH)?;
            let batch_len = members.len();
            for member in members {
                if let Ok(key) = member.parse::<u64>() {
                    if let Some(entry) = self.read_value(queue, key)? {
                        entries.push(entry);
                    }
                }
            }
            if batch_len < SCAN_BATCH {
                break;
            }
            offset += batch_len;
        }
        Ok(entries)
    }

    fn empty(&self, queue: &str) -> Result<(), QueueError> {
        let index = Self::index_key(queue);
        loop {
            let members = self.store.zrange(&index, 0, SCAN_BATCH)?;
            if members.is_empty() {
                break;
            }
            for member in &members {
                if let Ok(key) = member.parse::<u64>() {
                    self.store.delete(&Self::value_key(queue, key))?;
                }
                self.store.zrem(&index, member)?;
            }
        }
        self.store.delete(&index)?;
        Ok(())
    }

    fn list_queues(&self) -> Result<Vec<String>, QueueError> {
        Ok(self.store.set_members(QUEUE_SET)?)
    }

    fn remove_queues(&self, queues: &[String]) -> Result<(), QueueError> {
        let queues = if queues.is_empty() {
            self.list_queues()?
        } else {
            queues.to_vec()
        };
        for queue in &queues {
            self.empty(queue)?;
            self.store.set_remove(QUEUE_SET, queue)?;
        }
        Ok(())
    }
}
