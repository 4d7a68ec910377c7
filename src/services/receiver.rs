//! Per-queue handle for polling and message lifecycle.

use super::dispatcher::BatchDispatcher;
use crate::backend::QueueBackend;
use crate::config::BulkConfig;
use crate::error::BulkError;
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// A handle on one queue.
///
/// Receives short- or long-poll, and manages deliveries one receipt handle
/// at a time. Out-of-range settings are clamped to what the service accepts
/// rather than rejected.
pub struct PollingReceiver {
    queue_url: String,
    backend: Arc<dyn QueueBackend>,
    max_messages: u32,
    max_wait: Duration,
}

impl PollingReceiver {
    /// Create a handle on `queue_url`, taking defaults from `config`.
    pub fn new(config: &BulkConfig, backend: Arc<dyn QueueBackend>, queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            backend,
            max_messages: config.effective_max_messages(),
            max_wait: config.effective_max_wait(),
        }
    }

    /// The queue URL.
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Messages requested per receive call.
    pub fn max_messages(&self) -> u32 {
        self.max_messages
    }

    /// Set the messages requested per receive call, clamped to 1..=10.
    ///
    /// Returns the value actually stored.
    pub fn set_max_messages(&mut self, n: u32) -> u32 {
        self.max_messages = clamp_max_messages(n);
        if self.max_messages != n {
            debug!(requested = n, effective = self.max_messages, "Clamped max messages");
        }
        self.max_messages
    }

    /// Short-poll: return whatever is available now, possibly nothing.
    #[instrument(skip(self), fields(queue_url = %self.queue_url))]
    pub async fn receive(&self) -> Result<Vec<Message>, BulkError> {
        self.receive_inner(None).await
    }

    /// Long-poll for up to `wait`, returning early when messages arrive.
    ///
    /// `wait` is capped at the service maximum of 20 seconds.
    #[instrument(skip(self), fields(queue_url = %self.queue_url))]
    pub async fn receive_with_wait(&self, wait: Duration) -> Result<Vec<Message>, BulkError> {
        self.receive_inner(Some(wait.min(self.max_wait))).await
    }

    async fn receive_inner(&self, wait: Option<Duration>) -> Result<Vec<Message>, BulkError> {
        let request = ReceiveRequest {
            queue_url: self.queue_url.clone(),
            max_messages: self.max_messages,
            wait,
        };
        let messages = self
            .backend
            .receive_messages(request)
            .await
            .map_err(|e| e.with_resource(&self.queue_url))?;
        debug!(received = messages.len(), "Receive complete");
        Ok(messages)
    }

    /// Change how long a received message stays hidden.
    ///
    /// Zero makes it visible again immediately.
    pub async fn change_visibility(
        &self,
        receipt: &ReceiptHandle,
        timeout: Duration,
    ) -> Result<(), BulkError> {
        self.backend
            .change_visibility(&self.queue_url, receipt, timeout)
            .await
            .map_err(|e| e.with_resource(&self.queue_url))
    }

    /// Delete a received message.
    pub async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), BulkError> {
        self.backend
            .delete_message(&self.queue_url, receipt)
            .await
            .map_err(|e| e.with_resource(&self.queue_url))
    }

    /// Send one message, returning its ID.
    pub async fn send(&self, body: &str) -> Result<String, BulkError> {
        self.backend
            .send_message(&self.queue_url, body, None)
            .await
            .map_err(|e| e.with_resource(&self.queue_url))
    }

    /// Send one message that becomes visible after `delay` (at most 15 minutes).
    pub async fn send_with_delay(&self, body: &str, delay: Duration) -> Result<String, BulkError> {
        let delay = delay.min(MAX_DELIVERY_DELAY);
        self.backend
            .send_message(&self.queue_url, body, Some(delay))
            .await
            .map_err(|e| e.with_resource(&self.queue_url))
    }

    /// Send many messages through a [`BatchDispatcher`].
    pub async fn send_bulk<S: AsRef<str>>(
        &self,
        messages: &[S],
    ) -> Result<Vec<BatchFailureRecord>, BulkError> {
        BatchDispatcher::new(Arc::clone(&self.backend))
            .send_bulk(&self.queue_url, messages)
            .await
    }
}

impl std::fmt::Debug for PollingReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingReceiver")
            .field("queue_url", &self.queue_url)
            .field("max_messages", &self.max_messages)
            .field("max_wait", &self.max_wait)
            .finish()
    }
}
