//! Chunked batch sending.

use crate::backend::QueueBackend;
use crate::error::{BulkError, ResponseError};
use crate::types::{BatchEntry, BatchFailureRecord, MAX_BATCH_ENTRIES};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Sends arbitrarily many messages as a sequence of batch calls.
///
/// Messages go out in input order, ten per call. Entry IDs restart at `"0"`
/// in every call; each returned failure also carries the message's index in
/// the caller's list.
#[derive(Clone)]
pub struct BatchDispatcher {
    queue: Arc<dyn QueueBackend>,
}

impl BatchDispatcher {
    /// Create a new dispatcher.
    pub fn new(queue: Arc<dyn QueueBackend>) -> Self {
        Self { queue }
    }

    /// Send `messages` to `queue_url`.
    ///
    /// Returns the per-message failures of every chunk. A failed call aborts
    /// the remaining chunks; chunks already sent stay sent.
    #[instrument(skip(self, messages), fields(queue_url = %queue_url, messages = messages.len()))]
    pub async fn send_bulk<S: AsRef<str>>(
        &self,
        queue_url: &str,
        messages: &[S],
    ) -> Result<Vec<BatchFailureRecord>, BulkError> {
        let mut failures = Vec::new();

        for (chunk_index, chunk) in messages.chunks(MAX_BATCH_ENTRIES).enumerate() {
            let offset = chunk_index * MAX_BATCH_ENTRIES;
            let entries: Vec<BatchEntry> = chunk
                .iter()
                .enumerate()
                .map(|(i, body)| BatchEntry {
                    id: i.to_string(),
                    body: body.as_ref().to_string(),
                })
                .collect();

            debug!(chunk = chunk_index, size = entries.len(), "Sending batch");
            let reported = self
                .queue
                .send_message_batch(queue_url, entries)
                .await
                .map_err(|e| e.with_resource(queue_url))?;

            for failure in reported {
                let position = failure
                    .id
                    .parse::<usize>()
                    .ok()
                    .filter(|i| *i < chunk.len())
                    .ok_or_else(|| ResponseError::UnknownEntryId {
                        operation: "SendMessageBatch".to_string(),
                        id: failure.id.clone(),
                    })?;
                failures.push(BatchFailureRecord {
                    input_index: offset + position,
                    entry_id: failure.id,
                    code: failure.code,
                    message: failure.message,
                    sender_fault: failure.sender_fault,
                });
            }
        }

        if failures.is_empty() {
            info!("Bulk send complete");
        } else {
            warn!(failed = failures.len(), "Bulk send completed with failures");
        }
        Ok(failures)
    }
}
