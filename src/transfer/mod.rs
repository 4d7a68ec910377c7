//! Object transfers on a bounded worker pool.
//!
//! Uploads run as tokio tasks gated by a semaphore sized at construction.
//! Each upload is observable through a [`TransferHandle`]; blocking uploads
//! simply wait on their own handle. Downloads hold a pool slot for their
//! duration but run on the caller's task.
//!
//! Sources larger than [`TransferConfig::multipart_threshold`] are sent as
//! multipart uploads of [`TransferConfig::part_size`] parts, read from the
//! source one part at a time.

mod body;
mod handle;
mod upload;

pub use handle::{TransferHandle, TransferReceipt, TransferState};

use crate::backend::ObjectStoreBackend;
use crate::config::BulkConfig;
use crate::error::{BulkError, TransferError};
use crate::types::MIN_PART_SIZE;
use bytes::Bytes;
use futures::FutureExt;
use handle::TransferResult;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::{oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use upload::UploadJob;

/// Default part size (8 MiB).
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Default size above which uploads go multipart (8 MiB).
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Default number of parts of one upload in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Raw MD5 digest of `data`.
pub(crate) fn md5_digest(data: &[u8]) -> [u8; 16] {
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&Md5::digest(data));
    digest
}

/// Lowercase hex MD5 digest of `data`.
pub(crate) fn md5_hex(data: &[u8]) -> String {
    hex::encode(md5_digest(data))
}

/// Configuration for the transfer coordinator.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Most transfers running at once. `None` is unbounded.
    pub pool_size: Option<usize>,
    /// Compare plain ETags against the local MD5 after each upload and part.
    pub verify_checksums: bool,
    /// Size of each multipart part; the last part may be smaller.
    pub part_size: u64,
    /// Sources larger than this are uploaded in parts.
    pub multipart_threshold: u64,
    /// Most parts of one upload in flight at once.
    pub max_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            pool_size: None,
            verify_checksums: true,
            part_size: DEFAULT_PART_SIZE,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl TransferConfig {
    /// Create a new transfer configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the pool size from the shared configuration.
    pub fn from_bulk(config: &BulkConfig) -> Self {
        Self {
            pool_size: config.transfer_pool_size,
            ..Self::default()
        }
    }

    /// Bound the pool at `size` concurrent transfers.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size.max(1));
        self
    }

    /// Set the part size, raised to the service minimum of 5 MiB.
    pub fn with_part_size(mut self, size: u64) -> Self {
        self.part_size = size.max(MIN_PART_SIZE);
        self
    }

    /// Set the size above which uploads go multipart.
    pub fn with_multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = threshold;
        self
    }

    /// Set how many parts of one upload may be in flight at once.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Enable or disable ETag verification.
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }
}

/// Where upload content comes from.
pub enum TransferSource {
    /// In-memory bytes.
    Bytes(Bytes),
    /// A local file, read when the transfer starts.
    File(PathBuf),
    /// An async reader. With a declared length, exactly that many bytes are
    /// sent and a shorter stream fails the transfer.
    Reader {
        /// The stream.
        reader: Box<dyn AsyncRead + Send + Unpin>,
        /// Declared content length.
        content_length: Option<u64>,
    },
}

impl TransferSource {
    /// Upload in-memory bytes.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        TransferSource::Bytes(data.into())
    }

    /// Upload a local file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        TransferSource::File(path.into())
    }

    /// Upload everything `reader` produces.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        TransferSource::Reader {
            reader: Box::new(reader),
            content_length: None,
        }
    }

    /// Upload exactly `content_length` bytes from `reader`.
    pub fn reader_with_length<R>(reader: R, content_length: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        TransferSource::Reader {
            reader: Box::new(reader),
            content_length: Some(content_length),
        }
    }
}

impl std::fmt::Debug for TransferSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferSource::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            TransferSource::File(path) => f.debug_tuple("File").field(path).finish(),
            TransferSource::Reader { content_length, .. } => f
                .debug_struct("Reader")
                .field("content_length", content_length)
                .finish_non_exhaustive(),
        }
    }
}

/// Runs uploads and downloads on a worker pool it owns.
///
/// The pool is released by [`shutdown`](Self::shutdown) (drain) or
/// [`shutdown_now`](Self::shutdown_now) (cancel). Either way later
/// transfers fail with [`TransferError::ShutDown`]. Dropping the
/// coordinator aborts whatever is still running.
pub struct TransferCoordinator {
    store: Arc<dyn ObjectStoreBackend>,
    config: TransferConfig,
    permits: Option<Arc<Semaphore>>,
    tasks: Mutex<JoinSet<()>>,
    shut_down: AtomicBool,
}

impl TransferCoordinator {
    /// Create a coordinator over `store`.
    pub fn new(config: TransferConfig, store: Arc<dyn ObjectStoreBackend>) -> Self {
        let permits = config.pool_size.map(|n| Arc::new(Semaphore::new(n.max(1))));
        Self {
            store,
            config,
            permits,
            tasks: Mutex::new(JoinSet::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// The coordinator's configuration.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Number of spawned transfers that have not been reaped yet.
    pub fn active_transfers(&self) -> usize {
        let mut tasks = self.tasks.lock();
        reap(&mut tasks);
        tasks.len()
    }

    /// Whether the coordinator has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Upload and wait for the transfer to finish.
    pub async fn upload(
        &self,
        container: &str,
        key: &str,
        source: TransferSource,
    ) -> Result<TransferReceipt, BulkError> {
        self.upload_async(container, key, source)?.wait().await
    }

    /// Start an upload and return its handle immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn upload_async(
        &self,
        container: &str,
        key: &str,
        source: TransferSource,
    ) -> Result<TransferHandle, BulkError> {
        let job = UploadJob {
            store: Arc::clone(&self.store),
            container: container.to_string(),
            key: key.to_string(),
            config: self.config.clone(),
            permits: self.permits.clone(),
        };
        self.spawn(container, key, job.run(source))
    }

    /// Upload a local file, waiting for completion unless `background` is set.
    ///
    /// In background mode the receipt's size is unknown until the handle
    /// completes, so the handle is returned instead.
    pub async fn upload_file(
        &self,
        container: &str,
        key: &str,
        path: impl AsRef<Path>,
        background: bool,
    ) -> Result<Option<TransferHandle>, BulkError> {
        let handle = self.upload_async(container, key, TransferSource::file(path.as_ref()))?;
        if background {
            return Ok(Some(handle));
        }
        handle.wait().await?;
        Ok(None)
    }

    /// Download an object into memory.
    #[instrument(skip(self), fields(container = %container, key = %key))]
    pub async fn download(&self, container: &str, key: &str) -> Result<Bytes, BulkError> {
        let _permit = self.acquire().await?;
        let data = self
            .store
            .get_object(container, key)
            .await
            .map_err(|e| e.with_resource(format!("{container}/{key}")))?;
        debug!(size = data.len(), "Downloaded object");
        Ok(data)
    }

    /// Download an object into a local file, creating parent directories.
    #[instrument(skip(self, path), fields(container = %container, key = %key))]
    pub async fn download_to_file(
        &self,
        container: &str,
        key: &str,
        path: impl AsRef<Path>,
    ) -> Result<TransferReceipt, BulkError> {
        let path = path.as_ref();
        let _permit = self.acquire().await?;
        let data = self
            .store
            .get_object(container, key)
            .await
            .map_err(|e| e.with_resource(format!("{container}/{key}")))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::file(parent, e))?;
        }
        tokio::fs::write(path, &data)
            .await
            .map_err(|e| TransferError::file(path, e))?;
        debug!(size = data.len(), path = %path.display(), "Downloaded object to file");

        Ok(TransferReceipt {
            container: container.to_string(),
            key: key.to_string(),
            size: data.len() as u64,
            e_tag: None,
            version_id: None,
        })
    }

    /// Stop accepting work and wait for in-flight transfers to finish.
    pub async fn shutdown(&self) {
        let mut tasks = {
            let mut tasks = self.tasks.lock();
            self.shut_down.store(true, Ordering::SeqCst);
            std::mem::take(&mut *tasks)
        };
        let outstanding = tasks.len();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Transfer task ended abnormally");
            }
        }
        if let Some(permits) = &self.permits {
            permits.close();
        }
        info!(drained = outstanding, "Transfer coordinator shut down");
    }

    /// Stop accepting work and abort in-flight transfers.
    ///
    /// Aborted transfers report `Failed` through their handles.
    pub fn shutdown_now(&self) {
        let mut tasks = self.tasks.lock();
        self.shut_down.store(true, Ordering::SeqCst);
        if let Some(permits) = &self.permits {
            permits.close();
        }
        reap(&mut tasks);
        if !tasks.is_empty() {
            warn!(aborted = tasks.len(), "Aborting in-flight transfers");
        }
        tasks.abort_all();
    }

    async fn acquire(&self) -> Result<Option<OwnedSemaphorePermit>, BulkError> {
        if self.is_shut_down() {
            return Err(TransferError::ShutDown.into());
        }
        match &self.permits {
            Some(permits) => Arc::clone(permits)
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|_| TransferError::ShutDown.into()),
            None => Ok(None),
        }
    }

    fn spawn<F>(&self, container: &str, key: &str, work: F) -> Result<TransferHandle, BulkError>
    where
        F: Future<Output = TransferResult> + Send + 'static,
    {
        let (state_tx, state_rx) = watch::channel(TransferState::Pending);
        let (result_tx, result_rx) = oneshot::channel();
        let permits = self.permits.clone();
        let task_key = key.to_string();
        let span = info_span!("transfer", container = %container, key = %key);

        let task = async move {
            let _permit = match permits {
                Some(permits) => match permits.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        let err = TransferError::ShutDown;
                        state_tx.send_replace(TransferState::Failed(err.to_string()));
                        let _ = result_tx.send(Err(err.into()));
                        return;
                    }
                },
                None => None,
            };

            state_tx.send_replace(TransferState::InProgress);
            let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => Err(TransferError::Panicked { key: task_key }.into()),
            };

            match &outcome {
                Ok(receipt) => {
                    debug!(size = receipt.size, "Transfer completed");
                    state_tx.send_replace(TransferState::Completed);
                }
                Err(e) => {
                    warn!(error = %e, "Transfer failed");
                    state_tx.send_replace(TransferState::Failed(e.to_string()));
                }
            }
            let _ = result_tx.send(outcome);
        };

        // The flag is only set under this lock, so a task spawned here is
        // always seen by shutdown.
        let mut tasks = self.tasks.lock();
        if self.is_shut_down() {
            return Err(TransferError::ShutDown.into());
        }
        reap(&mut tasks);
        tasks.spawn(task.instrument(span));

        Ok(TransferHandle::new(
            container.to_string(),
            key.to_string(),
            state_rx,
            result_rx,
        ))
    }
}

impl Drop for TransferCoordinator {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        reap(tasks);
        if !tasks.is_empty() {
            debug!(outstanding = tasks.len(), "Dropping coordinator with transfers in flight");
            tasks.abort_all();
        }
    }
}

impl std::fmt::Debug for TransferCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferCoordinator")
            .field("config", &self.config)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn reap(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.try_join_next() {
        if let Err(e) = joined {
            if e.is_panic() {
                warn!(error = %e, "Transfer task panicked");
            }
        }
    }
}

/// Compare a reported ETag with a local MD5.
///
/// Multipart ETags (`<md5>-<parts>`) are not content digests and pass.
fn verify_etag(expected: String, e_tag: &str) -> Result<(), TransferError> {
    let reported = e_tag.trim_matches('"');
    if reported.contains('-') || reported.eq_ignore_ascii_case(&expected) {
        return Ok(());
    }
    Err(TransferError::ChecksumMismatch {
        expected,
        actual: reported.to_string(),
    })
}
