//! In-process store: the same primitives, one lock per call.
//!
//! Each trait method takes the lock once, so every call is atomic exactly
//! like a single command against a networked store. That is what makes the
//! compare-and-delete protocol exercisable from plain threads in tests.

use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::Mutex;

use super::{Store, StoreError};

#[derive(Default)]
struct Zset {
    by_score: BTreeSet<(i64, String)>,
    scores: HashMap<String, i64>,
}

#[derive(Default)]
struct Tables {
    strings: HashMap<String, String>,
    counters: HashMap<String, u64>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, Zset>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tables.lock().strings.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.tables
            .lock()
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let existed = tables.strings.remove(key).is_some()
            | tables.counters.remove(key).is_some()
            | tables.sets.remove(key).is_some()
            | tables.zsets.remove(key).is_some();
        Ok(existed)
    }

    fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        let counter = tables.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.tables
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .lock()
            .sets
            .get_mut(key)
            .is_some_and(|set| set.remove(member)))
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .tables
            .lock()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let zset = tables.zsets.entry(key.to_string()).or_default();
        if let Some(old) = zset.scores.insert(member.to_string(), score) {
            zset.by_score.remove(&(old, member.to_string()));
        }
        zset.by_score.insert((score, member.to_string()));
        Ok(())
    }

    fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let Some(zset) = tables.zsets.get_mut(key) else {
            return Ok(false);
        };
        match zset.scores.remove(member) {
            Some(score) => {
                zset.by_score.remove(&(score, member.to_string()));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn zrange_by_score(
        &self,
        key: &str,
        max: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .tables
            .lock()
            .zsets
            .get(key)
            .map(|zset| {
                zset.by_score
                    .iter()
                    .take_while(|(score, _)| *score <= max)
                    .skip(offset)
                    .take(limit)
                    .map(|(_, member)| member.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn zrange(&self, key: &str, offset: usize, limit: usize) -> Result<Vec<String>, StoreError> {
        Ok(self
            .tables
            .lock()
            .zsets
            .get(key)
            .map(|zset| {
                zset.by_score
                    .iter()
                    .skip(offset)
                    .take(limit)
                    .map(|(_, member)| member.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self
            .tables
            .lock()
            .zsets
            .get(key)
            .map(|zset| zset.by_score.len() as u64)
            .unwrap_or_default())
    }
}
