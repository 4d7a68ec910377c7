//! The upload path: a single put for small sources, multipart above the
//! threshold.

use super::body::{concat, ChunkedBody};
use super::handle::TransferResult;
use super::{md5_hex, verify_etag, TransferConfig, TransferReceipt, TransferSource};
use crate::backend::ObjectStoreBackend;
use crate::error::{BulkError, TransferError};
use crate::types::{CompletedPart, MAX_PARTS};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

/// One upload, as scheduled by the coordinator.
pub(super) struct UploadJob {
    pub(super) store: Arc<dyn ObjectStoreBackend>,
    pub(super) container: String,
    pub(super) key: String,
    pub(super) config: TransferConfig,
    pub(super) permits: Option<Arc<Semaphore>>,
}

impl UploadJob {
    fn resource(&self) -> String {
        format!("{}/{}", self.container, self.key)
    }

    fn part_len(&self) -> usize {
        usize::try_from(self.config.part_size).unwrap_or(usize::MAX)
    }

    /// Read up to the threshold, then pick the upload strategy.
    pub(super) async fn run(self, source: TransferSource) -> TransferResult {
        let mut body = ChunkedBody::open(source).await?;
        let mut head = Vec::new();
        let mut buffered = 0u64;
        while buffered <= self.config.multipart_threshold {
            match body.next_chunk(self.part_len()).await? {
                Some(chunk) => {
                    buffered += chunk.len() as u64;
                    head.push(chunk);
                }
                None => return self.put_single(concat(head)).await,
            }
        }
        self.put_multipart(head, body).await
    }

    async fn put_single(&self, body: Bytes) -> TransferResult {
        let size = body.len() as u64;
        let expected = self.config.verify_checksums.then(|| md5_hex(&body));

        let output = self
            .store
            .put_object(&self.container, &self.key, body)
            .await
            .map_err(|e| e.with_resource(self.resource()))?;

        if let (Some(expected), Some(e_tag)) = (expected, output.e_tag.as_deref()) {
            verify_etag(expected, e_tag)?;
        }

        Ok(TransferReceipt {
            container: self.container.clone(),
            key: self.key.clone(),
            size,
            e_tag: output.e_tag,
            version_id: output.version_id,
        })
    }

    /// Create, upload parts, complete. Any failure after creation aborts
    /// the upload so no parts are left behind.
    async fn put_multipart(&self, head: Vec<Bytes>, body: ChunkedBody) -> TransferResult {
        let upload_id = self
            .store
            .create_multipart_upload(&self.container, &self.key)
            .await
            .map_err(|e| e.with_resource(self.resource()))?;
        info!(upload_id = %upload_id, "Started multipart upload");

        let outcome = match self.upload_parts(&upload_id, head, body).await {
            Ok((parts, size)) => {
                let count = parts.len();
                self.store
                    .complete_multipart_upload(&self.container, &self.key, &upload_id, parts)
                    .await
                    .map(|output| (output, size, count))
                    .map_err(|e| e.with_resource(self.resource()))
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok((output, size, parts)) => {
                info!(parts, size, "Completed multipart upload");
                Ok(TransferReceipt {
                    container: self.container.clone(),
                    key: self.key.clone(),
                    size,
                    e_tag: output.e_tag,
                    version_id: output.version_id,
                })
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .store
                    .abort_multipart_upload(&self.container, &self.key, &upload_id)
                    .await
                {
                    warn!(upload_id = %upload_id, error = %abort_err, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    /// Upload every part, returning them in part order with the total size.
    ///
    /// The transfer's own pool slot covers one part. Further parts borrow
    /// slots that are free at that moment, up to `max_concurrency`, and never
    /// wait for one.
    async fn upload_parts(
        &self,
        upload_id: &str,
        head: Vec<Bytes>,
        mut body: ChunkedBody,
    ) -> Result<(Vec<CompletedPart>, u64), BulkError> {
        let target = Arc::new(PartTarget {
            store: Arc::clone(&self.store),
            container: self.container.clone(),
            key: self.key.clone(),
            upload_id: upload_id.to_string(),
            verify: self.config.verify_checksums,
        });
        let mut pending: VecDeque<Bytes> = head.into();
        let mut running = JoinSet::new();
        let mut completed = Vec::new();
        let mut next_part = 1u32;
        let mut size = 0u64;
        let mut exhausted = false;

        loop {
            while !exhausted && running.len() < self.config.max_concurrency {
                let permit = match (&self.permits, running.is_empty()) {
                    (Some(permits), false) => match Arc::clone(permits).try_acquire_owned() {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                    _ => None,
                };
                let chunk = match pending.pop_front() {
                    Some(chunk) => chunk,
                    None => match body.next_chunk(self.part_len()).await? {
                        Some(chunk) => chunk,
                        None => {
                            exhausted = true;
                            break;
                        }
                    },
                };
                if next_part > MAX_PARTS {
                    return Err(TransferError::TooManyParts {
                        limit: MAX_PARTS,
                        part_size: self.config.part_size,
                    }
                    .into());
                }
                size += chunk.len() as u64;
                running.spawn(
                    Arc::clone(&target)
                        .upload(next_part, chunk, permit)
                        .in_current_span(),
                );
                next_part += 1;
            }

            match running.join_next().await {
                Some(Ok(part)) => completed.push(part?),
                Some(Err(e)) if e.is_panic() => {
                    return Err(TransferError::Panicked { key: self.key.clone() }.into())
                }
                Some(Err(_)) => return Err(TransferError::Aborted { key: self.key.clone() }.into()),
                None => break,
            }
        }

        completed.sort_by_key(|p: &CompletedPart| p.part_number);
        Ok((completed, size))
    }
}

struct PartTarget {
    store: Arc<dyn ObjectStoreBackend>,
    container: String,
    key: String,
    upload_id: String,
    verify: bool,
}

impl PartTarget {
    async fn upload(
        self: Arc<Self>,
        part_number: u32,
        body: Bytes,
        _permit: Option<OwnedSemaphorePermit>,
    ) -> Result<CompletedPart, BulkError> {
        let len = body.len();
        let expected = self.verify.then(|| md5_hex(&body));
        let e_tag = self
            .store
            .upload_part(&self.container, &self.key, &self.upload_id, part_number, body)
            .await
            .map_err(|e| e.with_resource(format!("{}/{}", self.container, self.key)))?;
        if let Some(expected) = expected {
            verify_etag(expected, &e_tag)?;
        }
        debug!(part_number, size = len, "Uploaded part");
        Ok(CompletedPart { part_number, e_tag })
    }
}
