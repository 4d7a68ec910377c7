//! In-memory message queue.

use crate::backend::QueueBackend;
use crate::error::{BulkError, ServiceError, ServiceKind};
use crate::types::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

/// Default visibility timeout applied to received messages.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

/// Operations of [`InMemoryQueue`], for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOp {
    /// SendMessage.
    SendMessage,
    /// SendMessageBatch.
    SendMessageBatch,
    /// ReceiveMessage.
    ReceiveMessage,
    /// ChangeMessageVisibility.
    ChangeVisibility,
    /// DeleteMessage.
    DeleteMessage,
}

impl QueueOp {
    fn name(self) -> &'static str {
        match self {
            QueueOp::SendMessage => "SendMessage",
            QueueOp::SendMessageBatch => "SendMessageBatch",
            QueueOp::ReceiveMessage => "ReceiveMessage",
            QueueOp::ChangeVisibility => "ChangeMessageVisibility",
            QueueOp::DeleteMessage => "DeleteMessage",
        }
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
}

#[derive(Debug)]
struct Delivery {
    message: StoredMessage,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    visible: VecDeque<StoredMessage>,
    delayed: Vec<(Instant, StoredMessage)>,
    // keyed by the receipt handle of the current delivery
    in_flight: HashMap<String, Delivery>,
}

impl QueueState {
    /// Move delayed and expired messages back to the visible set.
    fn refresh(&mut self, now: Instant) {
        let (ready, waiting): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|(at, _)| *at <= now);
        self.delayed = waiting;
        self.visible.extend(ready.into_iter().map(|(_, m)| m));

        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, d)| d.visible_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();
        for handle in expired {
            if let Some(delivery) = self.in_flight.remove(&handle) {
                self.visible.push_front(delivery.message);
            }
        }
    }

    fn next_change(&self) -> Option<Instant> {
        let delayed = self.delayed.iter().map(|(at, _)| *at);
        let in_flight = self.in_flight.values().map(|d| d.visible_at);
        delayed.chain(in_flight).min()
    }
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    op: QueueOp,
    nth: Option<usize>,
    code: String,
}

/// In-memory [`QueueBackend`].
///
/// Received messages become invisible for [`DEFAULT_VISIBILITY_TIMEOUT`]
/// and reappear unless deleted. Long polls wake as soon as a message
/// becomes available. Batch calls are validated the way the service
/// validates them.
pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    arrivals: Notify,
    calls: Mutex<HashMap<QueueOp, usize>>,
    batches: Mutex<Vec<Vec<BatchEntry>>>,
    receives: Mutex<Vec<ReceiveRequest>>,
    rejected_bodies: Mutex<HashMap<String, String>>,
    failures: Mutex<Vec<InjectedFailure>>,
}

impl InMemoryQueue {
    /// Create a backend with no queues.
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            arrivals: Notify::new(),
            calls: Mutex::new(HashMap::new()),
            batches: Mutex::new(Vec::new()),
            receives: Mutex::new(Vec::new()),
            rejected_bodies: Mutex::new(HashMap::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Create a queue.
    pub fn create_queue(&self, url: &str) {
        self.queues.lock().entry(url.to_string()).or_default();
    }

    /// Enqueue a message directly.
    pub fn push(&self, url: &str, body: &str) {
        if let Some(q) = self.queues.lock().get_mut(url) {
            q.visible.push_back(StoredMessage {
                message_id: Uuid::new_v4().to_string(),
                body: body.to_string(),
            });
        }
        self.arrivals.notify_waiters();
    }

    /// Bodies currently visible, in delivery order.
    pub fn visible_bodies(&self, url: &str) -> Vec<String> {
        let mut queues = self.queues.lock();
        match queues.get_mut(url) {
            Some(q) => {
                q.refresh(Instant::now());
                q.visible.iter().map(|m| m.body.clone()).collect()
            }
            None => Vec::new(),
        }
    }

    /// Number of messages received but neither deleted nor visible again.
    pub fn in_flight_count(&self, url: &str) -> usize {
        self.queues.lock().get(url).map_or(0, |q| q.in_flight.len())
    }

    /// Number of messages waiting out a delivery delay.
    pub fn delayed_count(&self, url: &str) -> usize {
        self.queues.lock().get(url).map_or(0, |q| q.delayed.len())
    }

    /// Reject any batch entry carrying `body` with `code`.
    pub fn reject_body(&self, body: &str, code: &str) {
        self.rejected_bodies
            .lock()
            .insert(body.to_string(), code.to_string());
    }

    /// Fail every `op` call with `code`.
    pub fn fail(&self, op: QueueOp, code: &str) {
        self.failures.lock().push(InjectedFailure {
            op,
            nth: None,
            code: code.to_string(),
        });
    }

    /// Fail only the `n`th (1-based) `op` call with `code`.
    pub fn fail_nth(&self, op: QueueOp, n: usize, code: &str) {
        self.failures.lock().push(InjectedFailure {
            op,
            nth: Some(n),
            code: code.to_string(),
        });
    }

    /// Number of `op` calls made so far.
    pub fn calls(&self, op: QueueOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Entries of every batch call, in call order.
    pub fn batch_calls(&self) -> Vec<Vec<BatchEntry>> {
        self.batches.lock().clone()
    }

    /// Every receive request, in call order.
    pub fn receive_requests(&self) -> Vec<ReceiveRequest> {
        self.receives.lock().clone()
    }

    fn enter(&self, op: QueueOp, url: &str) -> Result<(), BulkError> {
        let count = {
            let mut calls = self.calls.lock();
            let count = calls.entry(op).or_insert(0);
            *count += 1;
            *count
        };

        let injected = self
            .failures
            .lock()
            .iter()
            .find(|f| f.op == op && f.nth.map_or(true, |n| n == count))
            .cloned();
        if let Some(f) = injected {
            return Err(error(op, &f.code, "injected failure", 500, url));
        }
        if !self.queues.lock().contains_key(url) {
            return Err(error(
                op,
                "AWS.SimpleQueueService.NonExistentQueue",
                "The specified queue does not exist.",
                400,
                url,
            ));
        }
        Ok(())
    }

    fn enqueue(&self, url: &str, body: &str, delay: Option<Duration>) -> String {
        let message = StoredMessage {
            message_id: Uuid::new_v4().to_string(),
            body: body.to_string(),
        };
        let id = message.message_id.clone();
        if let Some(q) = self.queues.lock().get_mut(url) {
            match delay.filter(|d| !d.is_zero()) {
                Some(d) => q.delayed.push((Instant::now() + d, message)),
                None => q.visible.push_back(message),
            }
        }
        id
    }

    fn take_visible(&self, url: &str, max: u32) -> (Vec<Message>, Option<Instant>) {
        let mut queues = self.queues.lock();
        let Some(q) = queues.get_mut(url) else {
            return (Vec::new(), None);
        };
        let now = Instant::now();
        q.refresh(now);

        let mut delivered = Vec::new();
        while delivered.len() < max as usize {
            let Some(message) = q.visible.pop_front() else {
                break;
            };
            let handle = Uuid::new_v4().simple().to_string();
            delivered.push(Message {
                message_id: message.message_id.clone(),
                body: message.body.clone(),
                receipt_handle: ReceiptHandle::new(handle.clone()),
            });
            q.in_flight.insert(
                handle,
                Delivery {
                    message,
                    visible_at: now + DEFAULT_VISIBILITY_TIMEOUT,
                },
            );
        }
        (delivered, q.next_change())
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn error(op: QueueOp, code: &str, message: &str, status: u16, url: &str) -> BulkError {
    BulkError::Service(
        ServiceError::new(ServiceKind::Queue, op.name(), code, message)
            .with_status(status)
            .with_resource(url),
    )
}

#[async_trait]
impl QueueBackend for InMemoryQueue {
    async fn send_message(
        &self,
        queue_url: &str,
        body: &str,
        delay: Option<Duration>,
    ) -> Result<String, BulkError> {
        self.enter(QueueOp::SendMessage, queue_url)?;
        let id = self.enqueue(queue_url, body, delay);
        self.arrivals.notify_waiters();
        Ok(id)
    }

    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: Vec<BatchEntry>,
    ) -> Result<Vec<BatchEntryFailure>, BulkError> {
        self.enter(QueueOp::SendMessageBatch, queue_url)?;
        self.batches.lock().push(entries.clone());

        let op = QueueOp::SendMessageBatch;
        if entries.is_empty() {
            return Err(error(op, "AWS.SimpleQueueService.EmptyBatchRequest", "empty batch", 400, queue_url));
        }
        if entries.len() > MAX_BATCH_ENTRIES {
            return Err(error(
                op,
                "AWS.SimpleQueueService.TooManyEntriesInBatchRequest",
                "too many entries",
                400,
                queue_url,
            ));
        }
        let distinct: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        if distinct.len() != entries.len() {
            return Err(error(
                op,
                "AWS.SimpleQueueService.BatchEntryIdsNotDistinct",
                "duplicate entry ids",
                400,
                queue_url,
            ));
        }

        let rejected = self.rejected_bodies.lock().clone();
        let mut failures = Vec::new();
        for entry in &entries {
            match rejected.get(&entry.body) {
                Some(code) => failures.push(BatchEntryFailure {
                    id: entry.id.clone(),
                    code: code.clone(),
                    message: "entry rejected".to_string(),
                    sender_fault: true,
                }),
                None => {
                    self.enqueue(queue_url, &entry.body, None);
                }
            }
        }
        self.arrivals.notify_waiters();
        Ok(failures)
    }

    async fn receive_messages(&self, request: ReceiveRequest) -> Result<Vec<Message>, BulkError> {
        self.enter(QueueOp::ReceiveMessage, &request.queue_url)?;
        self.receives.lock().push(request.clone());

        let deadline = request.wait.map(|w| Instant::now() + w);
        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (delivered, next_change) = self.take_visible(&request.queue_url, request.max_messages);
            let deadline = match deadline {
                Some(d) if delivered.is_empty() && Instant::now() < d => d,
                _ => return Ok(delivered),
            };

            let wake = next_change.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
        timeout: Duration,
    ) -> Result<(), BulkError> {
        let op = QueueOp::ChangeVisibility;
        self.enter(op, queue_url)?;
        if timeout > MAX_VISIBILITY_TIMEOUT {
            return Err(error(op, "InvalidParameterValue", "visibility timeout out of range", 400, queue_url));
        }

        let mut queues = self.queues.lock();
        let Some(q) = queues.get_mut(queue_url) else {
            return Ok(());
        };
        q.refresh(Instant::now());
        if timeout.is_zero() {
            let Some(delivery) = q.in_flight.remove(receipt.as_str()) else {
                return Err(error(op, "ReceiptHandleIsInvalid", "message is not in flight", 400, queue_url));
            };
            q.visible.push_front(delivery.message);
            drop(queues);
            self.arrivals.notify_waiters();
            return Ok(());
        }
        match q.in_flight.get_mut(receipt.as_str()) {
            Some(delivery) => {
                delivery.visible_at = Instant::now() + timeout;
                Ok(())
            }
            None => Err(error(op, "ReceiptHandleIsInvalid", "message is not in flight", 400, queue_url)),
        }
    }

    async fn delete_message(&self, queue_url: &str, receipt: &ReceiptHandle) -> Result<(), BulkError> {
        let op = QueueOp::DeleteMessage;
        self.enter(op, queue_url)?;
        let mut queues = self.queues.lock();
        let Some(q) = queues.get_mut(queue_url) else {
            return Ok(());
        };
        // A handle stops being valid once its message is deleted or its
        // visibility timeout lapses.
        q.refresh(Instant::now());
        match q.in_flight.remove(receipt.as_str()) {
            Some(_) => Ok(()),
            None => Err(error(op, "ReceiptHandleIsInvalid", "unknown receipt handle", 400, queue_url)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://sqs.us-east-1.amazonaws.com/123456789012/jobs";

    #[tokio::test]
    async fn test_received_message_is_hidden_until_deleted() {
        let queue = InMemoryQueue::new();
        queue.create_queue(URL);
        queue.push(URL, "hello");

        let request = ReceiveRequest {
            queue_url: URL.to_string(),
            max_messages: 10,
            wait: None,
        };
        let got = queue.receive_messages(request.clone()).await.unwrap();
        assert_eq!(got.len(), 1);
        assert!(queue.receive_messages(request).await.unwrap().is_empty());

        queue.delete_message(URL, &got[0].receipt_handle).await.unwrap();
        assert_eq!(queue.in_flight_count(URL), 0);
    }

    #[tokio::test]
    async fn test_batch_over_ten_entries_is_rejected() {
        let queue = InMemoryQueue::new();
        queue.create_queue(URL);
        let entries = (0..11)
            .map(|i| BatchEntry {
                id: i.to_string(),
                body: format!("m{i}"),
            })
            .collect();

        let err = queue.send_message_batch(URL, entries).await.unwrap_err();
        assert_eq!(err.code(), Some("AWS.SimpleQueueService.TooManyEntriesInBatchRequest"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_timeout_expires() {
        let queue = InMemoryQueue::new();
        queue.create_queue(URL);
        queue.push(URL, "again");

        let request = ReceiveRequest {
            queue_url: URL.to_string(),
            max_messages: 1,
            wait: None,
        };
        assert_eq!(queue.receive_messages(request.clone()).await.unwrap().len(), 1);

        tokio::time::advance(DEFAULT_VISIBILITY_TIMEOUT + Duration::from_secs(1)).await;
        let again = queue.receive_messages(request).await.unwrap();
        assert_eq!(again[0].body, "again");
    }

    #[tokio::test]
    async fn test_second_delete_with_same_handle_is_rejected() {
        let queue = InMemoryQueue::new();
        queue.create_queue(URL);
        queue.push(URL, "once");

        let request = ReceiveRequest {
            queue_url: URL.to_string(),
            max_messages: 1,
            wait: None,
        };
        let got = queue.receive_messages(request).await.unwrap();
        queue.delete_message(URL, &got[0].receipt_handle).await.unwrap();

        let err = queue
            .delete_message(URL, &got[0].receipt_handle)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("ReceiptHandleIsInvalid"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_from_earlier_delivery_is_stale() {
        let queue = InMemoryQueue::new();
        queue.create_queue(URL);
        queue.push(URL, "redelivered");

        let request = ReceiveRequest {
            queue_url: URL.to_string(),
            max_messages: 1,
            wait: None,
        };
        let first = queue.receive_messages(request.clone()).await.unwrap();
        tokio::time::advance(DEFAULT_VISIBILITY_TIMEOUT + Duration::from_secs(1)).await;
        let second = queue.receive_messages(request).await.unwrap();
        assert_ne!(first[0].receipt_handle, second[0].receipt_handle);

        let err = queue
            .delete_message(URL, &first[0].receipt_handle)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("ReceiptHandleIsInvalid"));
        let err = queue
            .change_visibility(URL, &first[0].receipt_handle, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("ReceiptHandleIsInvalid"));
        assert_eq!(queue.in_flight_count(URL), 1);

        queue.delete_message(URL, &second[0].receipt_handle).await.unwrap();
        assert_eq!(queue.in_flight_count(URL), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_is_invalid_once_visibility_lapses() {
        let queue = InMemoryQueue::new();
        queue.create_queue(URL);
        queue.push(URL, "late");

        let request = ReceiveRequest {
            queue_url: URL.to_string(),
            max_messages: 1,
            wait: None,
        };
        let got = queue.receive_messages(request).await.unwrap();
        tokio::time::advance(DEFAULT_VISIBILITY_TIMEOUT + Duration::from_secs(1)).await;

        let err = queue
            .delete_message(URL, &got[0].receipt_handle)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("ReceiptHandleIsInvalid"));
        assert_eq!(queue.visible_bodies(URL), vec!["late".to_string()]);
    }
}
