//! Handles on in-flight transfers.

use crate::error::{BulkError, TransferError};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};

/// Lifecycle of one transfer.
///
/// `Pending` until a pool slot is free, `InProgress` while running, then
/// exactly one of the terminal states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    /// Waiting for a pool slot.
    Pending,
    /// Running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error; carries the error's description.
    Failed(String),
}

impl TransferState {
    /// Whether the transfer has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed(_))
    }
}

/// Result of a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Container name.
    pub container: String,
    /// Object key.
    pub key: String,
    /// Bytes transferred.
    pub size: u64,
    /// Entity tag reported by the service.
    pub e_tag: Option<String>,
    /// Version identifier, in versioned containers.
    pub version_id: Option<String>,
}

pub(crate) type TransferResult = Result<TransferReceipt, BulkError>;

/// Observes one asynchronous upload.
///
/// Dropping the handle does not cancel the transfer.
#[derive(Debug)]
pub struct TransferHandle {
    container: String,
    key: String,
    state: watch::Receiver<TransferState>,
    result: oneshot::Receiver<TransferResult>,
}

impl TransferHandle {
    pub(crate) fn new(
        container: String,
        key: String,
        state: watch::Receiver<TransferState>,
        result: oneshot::Receiver<TransferResult>,
    ) -> Self {
        Self {
            container,
            key,
            state,
            result,
        }
    }

    /// Container being written.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Key being written.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state.
    ///
    /// A transfer whose task was aborted before finishing reports `Failed`.
    pub fn state(&self) -> TransferState {
        let current = self.state.borrow().clone();
        if !current.is_terminal() && self.state.has_changed().is_err() {
            return TransferState::Failed(
                TransferError::Aborted {
                    key: self.key.clone(),
                }
                .to_string(),
            );
        }
        current
    }

    /// Whether the transfer has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wait for the transfer to finish.
    pub async fn wait(self) -> Result<TransferReceipt, BulkError> {
        match self.result.await {
            Ok(result) => result,
            Err(_) => Err(TransferError::Aborted { key: self.key }.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (
        TransferHandle,
        watch::Sender<TransferState>,
        oneshot::Sender<TransferResult>,
    ) {
        let (state_tx, state_rx) = watch::channel(TransferState::Pending);
        let (result_tx, result_rx) = oneshot::channel();
        let handle = TransferHandle::new("b".into(), "k".into(), state_rx, result_rx);
        (handle, state_tx, result_tx)
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransferState::Pending.is_terminal());
        assert!(!TransferState::InProgress.is_terminal());
        assert!(TransferState::Completed.is_terminal());
        assert!(TransferState::Failed("x".into()).is_terminal());
    }

    #[tokio::test]
    async fn test_dropped_task_reports_aborted() {
        let (handle, state_tx, result_tx) = handle();
        state_tx.send_replace(TransferState::InProgress);
        drop(state_tx);
        drop(result_tx);

        assert!(matches!(handle.state(), TransferState::Failed(_)));
        match handle.wait().await {
            Err(BulkError::Transfer(TransferError::Aborted { key })) => assert_eq!(key, "k"),
            other => panic!("Expected Aborted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_completed_state_survives_sender_drop() {
        let (handle, state_tx, _result_tx) = handle();
        state_tx.send_replace(TransferState::Completed);
        drop(state_tx);
        assert_eq!(handle.state(), TransferState::Completed);
    }
}
