//! Integration tests for BatchDispatcher.

use aws_bulk::error::{BulkError, ResponseError};
use aws_bulk::mocks::{InMemoryQueue, QueueOp};
use aws_bulk::services::BatchDispatcher;
use std::sync::Arc;
use test_case::test_case;

const QUEUE_URL: &str = "https://sqs.us-east-1.amazonaws.com/123456789012/work";

fn create_queue() -> Arc<InMemoryQueue> {
    let queue = Arc::new(InMemoryQueue::new());
    queue.create_queue(QUEUE_URL);
    queue
}

fn messages(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("msg-{i}")).collect()
}

#[tokio::test]
async fn test_twenty_three_messages_in_three_chunks() {
    let queue = create_queue();
    queue.reject_body("msg-15", "InvalidMessageContents");
    let dispatcher = BatchDispatcher::new(queue.clone());

    let failures = dispatcher.send_bulk(QUEUE_URL, &messages(23)).await.unwrap();

    let batches = queue.batch_calls();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 3]);
    for batch in &batches {
        let ids: Vec<&str> = batch.iter().map(|e| e.id.as_str()).collect();
        let expected: Vec<String> = (0..batch.len()).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    assert_eq!(failures.len(), 1);
    let failure = &failures[0];
    assert_eq!(failure.entry_id, "5");
    assert_eq!(failure.input_index, 15);
    assert_eq!(failure.code, "InvalidMessageContents");
    assert!(failure.sender_fault);

    assert_eq!(queue.visible_bodies(QUEUE_URL).len(), 22);
}

#[tokio::test]
async fn test_dispatched_entries_preserve_input_order() {
    let queue = create_queue();
    let dispatcher = BatchDispatcher::new(queue.clone());
    let input = messages(17);

    dispatcher.send_bulk(QUEUE_URL, &input).await.unwrap();

    let sent: Vec<String> = queue
        .batch_calls()
        .into_iter()
        .flatten()
        .map(|e| e.body)
        .collect();
    assert_eq!(sent, input);
    assert_eq!(queue.visible_bodies(QUEUE_URL), input);
}

#[test_case(0, 0; "no messages")]
#[test_case(1, 1; "single message")]
#[test_case(10, 1; "exactly one chunk")]
#[test_case(11, 2; "one over a chunk")]
#[test_case(20, 2; "exact multiple")]
#[test_case(95, 10; "many chunks")]
#[tokio::test]
async fn test_call_count(n: usize, expected_calls: usize) {
    let queue = create_queue();
    let dispatcher = BatchDispatcher::new(queue.clone());

    let failures = dispatcher.send_bulk(QUEUE_URL, &messages(n)).await.unwrap();

    assert!(failures.is_empty());
    assert_eq!(queue.calls(QueueOp::SendMessageBatch), expected_calls);
}

#[tokio::test]
async fn test_accepts_str_slices() {
    let queue = create_queue();
    let dispatcher = BatchDispatcher::new(queue.clone());

    dispatcher.send_bulk(QUEUE_URL, &["a", "b"]).await.unwrap();

    assert_eq!(queue.visible_bodies(QUEUE_URL), vec!["a", "b"]);
}

#[tokio::test]
async fn test_failed_chunk_call_aborts_remaining_chunks() {
    let queue = create_queue();
    queue.fail_nth(QueueOp::SendMessageBatch, 2, "ServiceUnavailable");
    let dispatcher = BatchDispatcher::new(queue.clone());

    let result = dispatcher.send_bulk(QUEUE_URL, &messages(25)).await;

    match result {
        Err(BulkError::Service(e)) => {
            assert_eq!(e.code, "ServiceUnavailable");
            assert_eq!(e.resource.as_deref(), Some(QUEUE_URL));
        }
        other => panic!("Expected ServiceError, got {:?}", other),
    }
    assert_eq!(queue.calls(QueueOp::SendMessageBatch), 2);
    assert_eq!(queue.visible_bodies(QUEUE_URL).len(), 10);
}

#[tokio::test]
async fn test_failures_across_chunks_are_aggregated() {
    let queue = create_queue();
    queue.reject_body("msg-0", "InvalidMessageContents");
    queue.reject_body("msg-19", "InvalidMessageContents");
    queue.reject_body("msg-20", "InvalidMessageContents");
    let dispatcher = BatchDispatcher::new(queue.clone());

    let failures = dispatcher.send_bulk(QUEUE_URL, &messages(21)).await.unwrap();

    let indexes: Vec<usize> = failures.iter().map(|f| f.input_index).collect();
    assert_eq!(indexes, vec![0, 19, 20]);
    let ids: Vec<&str> = failures.iter().map(|f| f.entry_id.as_str()).collect();
    assert_eq!(ids, vec!["0", "9", "0"]);
}

#[tokio::test]
async fn test_missing_queue_is_an_error() {
    let queue = Arc::new(InMemoryQueue::new());
    let dispatcher = BatchDispatcher::new(queue);

    let err = dispatcher.send_bulk(QUEUE_URL, &messages(3)).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!matches!(err, BulkError::Response(ResponseError::UnknownEntryId { .. })));
}
