//! Priority ordering, FIFO behavior, and delay gating.

use super::*;

fn priority_order(queue: &impl Backend) {
    queue
        .add("queue", json!("hello"), json!({"priority": 1}))
        .unwrap();
    queue
        .add("queue", json!("world"), json!({"priority": 2}))
        .unwrap();
    queue.add("queue", json!("vishnu"), json!({})).unwrap();

    let removed = queue.remove("queue").unwrap().unwrap();
    assert_eq!(removed.item(), &json!("world"));
    assert_eq!(removed.metadata().get("priority"), Some(&json!(2)));

    assert_eq!(item(&queue.remove("queue").unwrap()), &json!("hello"));
    assert_eq!(item(&queue.remove("queue").unwrap()), &json!("vishnu"));
    assert!(queue.remove("queue").unwrap().is_none());
}

#[test]
fn priority_order_memory() {
    priority_order(&memory_backend());
}

#[test]
fn priority_order_durable() {
    priority_order(&durable_backend());
}

fn fifo_among_equal_priority(queue: &impl Backend) {
    for i in 0..5 {
        queue.add("queue", json!(i), json!({})).unwrap();
    }
    for i in 0..5 {
        assert_eq!(item(&queue.remove("queue").unwrap()), &json!(i));
    }
}

#[test]
fn fifo_among_equal_priority_memory() {
    fifo_among_equal_priority(&memory_backend());
}

#[test]
fn fifo_among_equal_priority_durable() {
    fifo_among_equal_priority(&durable_backend());
}

fn delay_gating(queue: &impl Backend) {
    let future = (chrono::Utc::now() + chrono::Duration::seconds(1)).to_rfc3339();
    queue.add("queue", json!("thrift"), json!({})).unwrap();
    queue
        .add("queue", json!("pincer"), json!({"dequeue-timestamp": future}))
        .unwrap();

    assert_eq!(item(&queue.remove("queue").unwrap()), &json!("thrift"));
    assert!(queue.remove("queue").unwrap().is_none());
    assert!(queue.peek("queue").unwrap().is_none());

    std::thread::sleep(std::time::Duration::from_millis(1100));
    assert_eq!(item(&queue.remove("queue").unwrap()), &json!("pincer"));
}

#[test]
fn delay_gating_memory() {
    delay_gating(&memory_backend());
}

#[test]
fn delay_gating_durable() {
    delay_gating(&durable_backend());
}

fn future_entries_counted_but_invisible(queue: &impl Backend) {
    let future = (chrono::Utc::now() + chrono::Duration::seconds(30)).to_rfc3339();
    queue
        .add("queue", json!("later"), json!({"dequeue-timestamp": future}))
        .unwrap();

    assert_eq!(queue.size("queue").unwrap(), 1);
    assert_eq!(queue.list("queue").unwrap().len(), 1);
    assert!(queue.remove("queue").unwrap().is_none());
    assert!(queue.peek("queue").unwrap().is_none());
}

#[test]
fn future_entries_counted_but_invisible_memory() {
    future_entries_counted_but_invisible(&memory_backend());
}

#[test]
fn future_entries_counted_but_invisible_durable() {
    future_entries_counted_but_invisible(&durable_backend());
}

fn out_of_range_priorities_clamp(queue: &impl Backend) {
    queue
        .add("queue", json!("zero"), json!({"priority": 0}))
        .unwrap();
    queue
        .add("queue", json!("overflow"), json!({"priority": 101}))
        .unwrap();

    for expected in ["zero", "overflow"] {
        let entry = queue.remove("queue").unwrap().unwrap();
        assert_eq!(entry.item(), &json!(expected));
        assert_eq!(entry.metadata().get("priority"), Some(&json!(1)));
    }
}

#[test]
fn out_of_range_priorities_clamp_memory() {
    out_of_range_priorities_clamp(&memory_backend());
}

#[test]
fn out_of_range_priorities_clamp_durable() {
    out_of_range_priorities_clamp(&durable_backend());
}

fn invalid_metadata_is_rejected(queue: &impl Backend) {
    let err = queue.add("queue", json!("x"), json!([1, 2])).unwrap_err();
    assert!(matches!(err, QueueError::InvalidMetadata(_)));
    assert_eq!(queue.size("queue").unwrap(), 0);
}

#[test]
fn invalid_metadata_is_rejected_memory() {
    invalid_metadata_is_rejected(&memory_backend());
}

#[test]
fn invalid_metadata_is_rejected_durable() {
    invalid_metadata_is_rejected(&durable_backend());
}

fn keys_are_fresh_and_increasing(queue: &impl Backend) {
    let first = queue.add("queue", json!("a"), json!({})).unwrap();
    let second = queue.add("queue", json!("b"), json!({})).unwrap();
    assert!(second > first);
}

#[test]
fn keys_are_fresh_and_increasing_memory() {
    keys_are_fresh_and_increasing(&memory_backend());
}

#[test]
fn keys_are_fresh_and_increasing_durable() {
    keys_are_fresh_and_increasing(&durable_backend());
}
