//! Core queue behavior, exercised against both local engines.

use std::sync::Arc;

use serde_json::{json, Value};

use super::backend::{Backend, QueueItem};
use super::durable::DurableBackend;
use super::error::{Disposition, QueueError};
use super::memory::MemoryBackend;
use super::store::MemoryStore;

mod admin;
mod ordering;
mod reserve;

fn memory_backend() -> MemoryBackend {
    MemoryBackend::new()
}

fn durable_backend() -> DurableBackend {
    DurableBackend::new(Arc::new(MemoryStore::new()))
}

fn item(entry: &Option<QueueItem>) -> &Value {
    entry.as_ref().expect("expected an entry").item()
}
