//! The closed operation table shared by the broker and the replicator.
//!
//! Wire requests name operations as strings; this maps each known name to
//! a typed call against a backend and a JSON reply value. Unknown names
//! fall through to an explicit error instead of reflection.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::Envelope;

use super::backend::{Backend, QueueItem};
use super::error::QueueError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(&'static str),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

fn queue_arg<'a>(args: &'a [Value], index: usize) -> Result<&'a str, DispatchError> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or(DispatchError::InvalidArguments("queue name must be a string"))
}

fn json_reply<T: serde::Serialize>(value: T) -> Result<Value, DispatchError> {
    serde_json::to_value(value).map_err(|e| DispatchError::Queue(QueueError::from(e)))
}

fn entry_reply(entry: Option<QueueItem>) -> Result<Value, DispatchError> {
    match entry {
        Some(entry) => json_reply(entry),
        None => Ok(Value::Null),
    }
}

/// Execute one named operation against a backend.
pub fn dispatch<B: Backend>(backend: &B, operation: &Envelope) -> Result<Value, DispatchError> {
    let args = operation.args();
    match operation.method() {
        "add" => {
            let queue = queue_arg(args, 0)?;
            let item = args
                .get(1)
                .cloned()
                .ok_or(DispatchError::InvalidArguments("add requires an item"))?;
            let metadata = args
                .get(2)
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            let key = backend.add(queue, item, metadata)?;
            Ok(Value::from(key))
        }
        "add_bulk" => {
            let queue = queue_arg(args, 0)?;
            let items = match args.get(1) {
                Some(Value::Array(items)) => items.clone(),
                _ => {
                    return Err(DispatchError::InvalidArguments(
                        "add_bulk requires an item array",
                    ))
                }
            };
            backend.add_bulk(queue, items)?;
            Ok(Value::Null)
        }
        "remove" => entry_reply(backend.remove(queue_arg(args, 0)?)?),
        "peek" => entry_reply(backend.peek(queue_arg(args, 0)?)?),
        "size" => Ok(Value::from(backend.size(queue_arg(args, 0)?)?)),
        "list" => json_reply(backend.list(queue_arg(args, 0)?)?),
        "empty" => {
            backend.empty(queue_arg(args, 0)?)?;
            Ok(Value::Null)
        }
        "list_queues" => json_reply(backend.list_queues()?),
        "remove_queues" | "remove_queue" => {
            let queues = args
                .iter()
                .map(|value| value.as_str().map(String::from))
                .collect::<Option<Vec<_>>>()
                .ok_or(DispatchError::InvalidArguments(
                    "queue names must be strings",
                ))?;
            backend.remove_queues(&queues)?;
            Ok(Value::Null)
        }
        other => Err(DispatchError::UnknownOperation(other.to_string())),
    }
}
