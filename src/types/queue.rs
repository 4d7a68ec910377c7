//! Message queue types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Most entries a single batch-send call accepts.
pub const MAX_BATCH_ENTRIES: usize = 10;

/// Most messages a single receive call returns.
pub const MAX_RECEIVE_MESSAGES: u32 = 10;

/// Longest long-poll wait the service honours.
pub const MAX_LONG_POLL_WAIT: Duration = Duration::from_secs(20);

/// Longest per-message delivery delay the service honours.
pub const MAX_DELIVERY_DELAY: Duration = Duration::from_secs(900);

/// Clamp a requested receive size into 1..=10.
pub fn clamp_max_messages(n: u32) -> u32 {
    n.clamp(1, MAX_RECEIVE_MESSAGES)
}

/// Whole seconds covering `d`, rounded up.
///
/// The queue API takes integer seconds. Rounding down would turn a
/// sub-second long poll into a short poll and a sub-second visibility
/// timeout into an immediate redelivery.
pub fn ceil_seconds(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Opaque token identifying one delivery of a message.
///
/// Valid until the message is deleted, its visibility timeout expires and it
/// is redelivered, or the queue is purged.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Wrap a raw receipt handle.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// The raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // handles run to hundreds of characters
        let short: String = self.0.chars().take(12).collect();
        write!(f, "ReceiptHandle({short}…)")
    }
}

impl From<&str> for ReceiptHandle {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ReceiptHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A received message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Service-assigned message ID.
    pub message_id: String,
    /// Message body.
    pub body: String,
    /// Receipt handle for this delivery.
    pub receipt_handle: ReceiptHandle,
}

/// One entry of a batch-send call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Entry ID, unique within the call.
    pub id: String,
    /// Message body.
    pub body: String,
}

/// A per-entry failure reported by a batch-send call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntryFailure {
    /// The entry ID from the request.
    pub id: String,
    /// Provider error code.
    pub code: String,
    /// Provider message.
    pub message: String,
    /// Whether the service blames the sender.
    pub sender_fault: bool,
}

/// A failed message from a bulk send.
///
/// `entry_id` is the per-chunk wire ID; `input_index` is the message's
/// position in the list passed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailureRecord {
    /// Entry ID within its chunk ("0".."9").
    pub entry_id: String,
    /// Position in the caller's input list.
    pub input_index: usize,
    /// Provider error code.
    pub code: String,
    /// Provider message.
    pub message: String,
    /// Whether the service blames the sender.
    pub sender_fault: bool,
}

/// Parameters for one ReceiveMessage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Queue URL.
    pub queue_url: String,
    /// Most messages to return (1..=10).
    pub max_messages: u32,
    /// Long-poll wait; `None` short-polls.
    pub wait: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_max_messages() {
        assert_eq!(clamp_max_messages(0), 1);
        assert_eq!(clamp_max_messages(5), 5);
        assert_eq!(clamp_max_messages(10), 10);
        assert_eq!(clamp_max_messages(15), 10);
    }

    #[test]
    fn test_ceil_seconds() {
        assert_eq!(ceil_seconds(Duration::ZERO), 0);
        assert_eq!(ceil_seconds(Duration::from_millis(1)), 1);
        assert_eq!(ceil_seconds(Duration::from_millis(500)), 1);
        assert_eq!(ceil_seconds(Duration::from_secs(3)), 3);
        assert_eq!(ceil_seconds(Duration::from_millis(19_200)), 20);
    }

    #[test]
    fn test_receipt_handle_debug_is_short() {
        let handle = ReceiptHandle::new("a".repeat(300));
        let debug = format!("{:?}", handle);
        assert!(debug.len() < 40);
        assert_eq!(handle.as_str().len(), 300);
    }
}
