//! Queue administration: peek, list, empty, and the queue registry.

use super::*;

fn peek_does_not_mutate(queue: &impl Backend) {
    queue.add("queue", json!("hello"), json!({})).unwrap();

    assert_eq!(item(&queue.peek("queue").unwrap()), &json!("hello"));
    assert_eq!(item(&queue.peek("queue").unwrap()), &json!("hello"));
    assert_eq!(queue.size("queue").unwrap(), 1);

    queue.remove("queue").unwrap();
    assert!(queue.peek("queue").unwrap().is_none());
}

#[test]
fn peek_does_not_mutate_memory() {
    peek_does_not_mutate(&memory_backend());
}

#[test]
fn peek_does_not_mutate_durable() {
    peek_does_not_mutate(&durable_backend());
}

fn list_in_score_order(queue: &impl Backend) {
    queue.add("queue", json!("hello"), json!({})).unwrap();
    queue.add("queue", json!("hello2"), json!({})).unwrap();
    queue
        .add("queue", json!("hello3"), json!({"priority": 3}))
        .unwrap();

    let listed: Vec<Value> = queue
        .list("queue")
        .unwrap()
        .iter()
        .map(|entry| entry.item().clone())
        .collect();
    assert_eq!(listed, vec![json!("hello3"), json!("hello"), json!("hello2")]);
}

#[test]
fn list_in_score_order_memory() {
    list_in_score_order(&memory_backend());
}

#[test]
fn list_in_score_order_durable() {
    list_in_score_order(&durable_backend());
}

fn empty_clears_but_keeps_the_queue_registered(queue: &impl Backend) {
    queue
        .add("queue", json!("hello"), json!({"priority": 1}))
        .unwrap();
    queue
        .add(
            "queue",
            json!("pincer"),
            json!({"dequeue-timestamp": chrono::Utc::now().to_rfc3339()}),
        )
        .unwrap();

    queue.empty("queue").unwrap();

    assert!(queue.remove("queue").unwrap().is_none());
    assert_eq!(queue.size("queue").unwrap(), 0);
    assert!(queue.list("queue").unwrap().is_empty());
    assert!(queue
        .list_queues()
        .unwrap()
        .contains(&"queue".to_string()));
}

#[test]
fn empty_clears_but_keeps_the_queue_registered_memory() {
    empty_clears_but_keeps_the_queue_registered(&memory_backend());
}

#[test]
fn empty_clears_but_keeps_the_queue_registered_durable() {
    empty_clears_but_keeps_the_queue_registered(&durable_backend());
}

fn remove_queues_unregisters(queue: &impl Backend) {
    queue.add("a", json!(1), json!({})).unwrap();
    queue.add("b", json!(2), json!({})).unwrap();

    let mut queues = queue.list_queues().unwrap();
    queues.sort();
    assert_eq!(queues, vec!["a", "b"]);

    queue.remove_queues(&["a".to_string()]).unwrap();
    assert_eq!(queue.list_queues().unwrap(), vec!["b"]);
    assert_eq!(queue.size("a").unwrap(), 0);

    // No names means every queue goes.
    queue.remove_queues(&[]).unwrap();
    assert!(queue.list_queues().unwrap().is_empty());
    assert_eq!(queue.size("b").unwrap(), 0);
}

#[test]
fn remove_queues_unregisters_memory() {
    remove_queues_unregisters(&memory_backend());
}

#[test]
fn remove_queues_unregisters_durable() {
    remove_queues_unregisters(&durable_backend());
}

fn add_bulk_enqueues_with_empty_metadata(queue: &impl Backend) {
    queue
        .add_bulk("queue", (0..10).map(|i| json!(i)).collect())
        .unwrap();

    assert_eq!(queue.size("queue").unwrap(), 10);
    let first = queue.remove("queue").unwrap().unwrap();
    assert_eq!(first.item(), &json!(0));
    assert!(first.metadata().is_empty());
}

#[test]
fn add_bulk_enqueues_with_empty_metadata_memory() {
    add_bulk_enqueues_with_empty_metadata(&memory_backend());
}

#[test]
fn add_bulk_enqueues_with_empty_metadata_durable() {
    add_bulk_enqueues_with_empty_metadata(&durable_backend());
}
