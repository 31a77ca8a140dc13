//! Reservation: remove with automatic put-back on failure or abort.

use super::*;

fn rollback_on_error(queue: &impl Backend) {
    queue
        .add("queue", json!("pincer"), json!({"priority": 2}))
        .unwrap();
    queue
        .add("queue", json!("thrift"), json!({"priority": 1}))
        .unwrap();

    let result = queue.reserve("queue", |entry| -> Result<Disposition<()>, QueueError> {
        assert_eq!(entry.item(), &json!("pincer"));
        Err(QueueError::Reservation("handler blew up".into()))
    });
    assert!(matches!(result, Err(QueueError::Reservation(_))));

    // The reserved entry is back in place, still first.
    let peeked = queue.peek("queue").unwrap().unwrap();
    assert_eq!(peeked.item(), &json!("pincer"));
    assert_eq!(queue.size("queue").unwrap(), 2);
}

#[test]
fn rollback_on_error_memory() {
    rollback_on_error(&memory_backend());
}

#[test]
fn rollback_on_error_durable() {
    rollback_on_error(&durable_backend());
}

fn rollback_on_abort(queue: &impl Backend) {
    queue
        .add("queue", json!("pincer"), json!({"priority": 2}))
        .unwrap();
    queue
        .add("queue", json!("thrift"), json!({"priority": 1}))
        .unwrap();

    let result = queue
        .reserve("queue", |_| -> Result<Disposition<()>, QueueError> {
            Ok(Disposition::Abort)
        })
        .unwrap();
    assert!(result.is_none());

    let peeked = queue.peek("queue").unwrap().unwrap();
    assert_eq!(peeked.item(), &json!("pincer"));
    assert_eq!(queue.size("queue").unwrap(), 2);
}

#[test]
fn rollback_on_abort_memory() {
    rollback_on_abort(&memory_backend());
}

#[test]
fn rollback_on_abort_durable() {
    rollback_on_abort(&durable_backend());
}

fn commit_deletes_the_entry(queue: &impl Backend) {
    queue.add("queue", json!("thrift"), json!({})).unwrap();

    let got = queue
        .reserve("queue", |entry| {
            Ok(Disposition::Commit(entry.item().clone()))
        })
        .unwrap();
    assert_eq!(got, Some(json!("thrift")));
    assert_eq!(queue.size("queue").unwrap(), 0);
    assert!(queue.remove("queue").unwrap().is_none());
}

#[test]
fn commit_deletes_the_entry_memory() {
    commit_deletes_the_entry(&memory_backend());
}

#[test]
fn commit_deletes_the_entry_durable() {
    commit_deletes_the_entry(&durable_backend());
}

fn handler_sees_item_and_metadata(queue: &impl Backend) {
    queue
        .add("queue", json!("pincer"), json!({"priority": 2}))
        .unwrap();

    let seen = queue
        .reserve("queue", |entry| {
            Ok(Disposition::Commit((
                entry.item().clone(),
                entry.metadata().clone(),
            )))
        })
        .unwrap()
        .unwrap();
    assert_eq!(seen.0, json!("pincer"));
    assert_eq!(seen.1.get("priority"), Some(&json!(2)));
}

#[test]
fn handler_sees_item_and_metadata_memory() {
    handler_sees_item_and_metadata(&memory_backend());
}

#[test]
fn handler_sees_item_and_metadata_durable() {
    handler_sees_item_and_metadata(&durable_backend());
}

fn reserve_on_empty_queue_skips_handler(queue: &impl Backend) {
    let result = queue
        .reserve("queue", |_| -> Result<Disposition<()>, QueueError> {
            panic!("handler must not run on an empty queue")
        })
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn reserve_on_empty_queue_skips_handler_memory() {
    reserve_on_empty_queue_skips_handler(&memory_backend());
}

#[test]
fn reserve_on_empty_queue_skips_handler_durable() {
    reserve_on_empty_queue_skips_handler(&durable_backend());
}
