//! In-memory object store.

use super::md5_etag;
use crate::backend::ObjectStoreBackend;
use crate::error::{BulkError, ServiceError, ServiceKind};
use crate::types::*;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Operations of [`InMemoryObjectStore`], for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// ListObjectsV2.
    ListObjects,
    /// ListObjectVersions.
    ListVersions,
    /// DeleteObject without a version.
    DeleteObject,
    /// DeleteObject with a version.
    DeleteVersion,
    /// HeadObject.
    HeadObject,
    /// PutObject.
    PutObject,
    /// CreateMultipartUpload.
    CreateMultipartUpload,
    /// UploadPart.
    UploadPart,
    /// CompleteMultipartUpload.
    CompleteMultipartUpload,
    /// AbortMultipartUpload.
    AbortMultipartUpload,
    /// GetObject.
    GetObject,
    /// DeleteBucket.
    DeleteContainer,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            StoreOp::ListObjects => "ListObjectsV2",
            StoreOp::ListVersions => "ListObjectVersions",
            StoreOp::DeleteObject | StoreOp::DeleteVersion => "DeleteObject",
            StoreOp::HeadObject => "HeadObject",
            StoreOp::PutObject => "PutObject",
            StoreOp::CreateMultipartUpload => "CreateMultipartUpload",
            StoreOp::UploadPart => "UploadPart",
            StoreOp::CompleteMultipartUpload => "CompleteMultipartUpload",
            StoreOp::AbortMultipartUpload => "AbortMultipartUpload",
            StoreOp::GetObject => "GetObject",
            StoreOp::DeleteContainer => "DeleteBucket",
        }
    }
}

#[derive(Debug, Clone)]
struct StoredVersion {
    seq: u64,
    version_id: String,
    // None for a delete marker
    data: Option<Bytes>,
}

#[derive(Debug, Default)]
struct Container {
    versioned: bool,
    // oldest first
    keys: BTreeMap<String, Vec<StoredVersion>>,
}

impl Container {
    fn current(&self, key: &str) -> Option<&StoredVersion> {
        self.keys
            .get(key)
            .and_then(|versions| versions.last())
            .filter(|v| v.data.is_some())
    }
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    op: StoreOp,
    key: Option<String>,
    code: String,
    status: u16,
}

#[derive(Debug)]
struct PendingUpload {
    container: String,
    key: String,
    parts: BTreeMap<u32, Bytes>,
}

#[derive(Default)]
struct StoreState {
    containers: HashMap<String, Container>,
    uploads: HashMap<String, PendingUpload>,
    next_seq: u64,
    failures: Vec<InjectedFailure>,
    reported_etag: Option<String>,
}

impl StoreState {
    fn upload(
        &self,
        upload_id: &str,
        op: StoreOp,
        container: &str,
        key: &str,
    ) -> Result<&PendingUpload, BulkError> {
        self.uploads
            .get(upload_id)
            .filter(|u| u.container == container && u.key == key)
            .ok_or_else(|| no_such_upload(op, container, key))
    }
}

/// Counts concurrent calls and remembers the peak.
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl StoreState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// In-memory [`ObjectStoreBackend`].
///
/// Listings follow the remote service's ordering: keys ascending, and within
/// a key, versions newest first. Cursors resume strictly after the last
/// returned entry, so deleting entries between pages never skips others.
/// Deleting the current object of a versioned container leaves a delete
/// marker behind, as the real service does.
pub struct InMemoryObjectStore {
    state: Mutex<StoreState>,
    page_size: u32,
    calls: Mutex<HashMap<StoreOp, usize>>,
    put_latency: Option<Duration>,
    puts: Gauge,
    parts: Gauge,
}

impl InMemoryObjectStore {
    /// Create an empty store with the service's default page size.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            page_size: 1000,
            calls: Mutex::new(HashMap::new()),
            put_latency: None,
            puts: Gauge::default(),
            parts: Gauge::default(),
        }
    }

    /// Set the default page size for list calls that don't request one.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every put and part upload take at least `latency`.
    pub fn with_put_latency(mut self, latency: Duration) -> Self {
        self.put_latency = Some(latency);
        self
    }

    /// Create a container.
    pub fn create_container(&self, name: &str, versioned: bool) {
        self.state.lock().containers.insert(
            name.to_string(),
            Container {
                versioned,
                keys: BTreeMap::new(),
            },
        );
    }

    /// Store an object, creating a new version in versioned containers.
    pub fn insert_object(&self, container: &str, key: &str, data: impl Into<Bytes>) {
        let mut state = self.state.lock();
        let seq = state.next_seq();
        if let Some(c) = state.containers.get_mut(container) {
            write_object(c, seq, key, Some(data.into()));
        }
    }

    /// Add a delete marker for `key`.
    pub fn insert_delete_marker(&self, container: &str, key: &str) {
        let mut state = self.state.lock();
        let seq = state.next_seq();
        if let Some(c) = state.containers.get_mut(container) {
            write_object(c, seq, key, None);
        }
    }

    /// Whether the container exists.
    pub fn container_exists(&self, container: &str) -> bool {
        self.state.lock().containers.contains_key(container)
    }

    /// Number of current objects in the container.
    pub fn object_count(&self, container: &str) -> usize {
        let state = self.state.lock();
        state
            .containers
            .get(container)
            .map(|c| c.keys.keys().filter(|k| c.current(k).is_some()).count())
            .unwrap_or(0)
    }

    /// Number of version records (delete markers included) in the container.
    pub fn version_count(&self, container: &str) -> usize {
        let state = self.state.lock();
        state
            .containers
            .get(container)
            .map(|c| c.keys.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Current content of an object.
    pub fn object(&self, container: &str, key: &str) -> Option<Bytes> {
        let state = self.state.lock();
        state
            .containers
            .get(container)
            .and_then(|c| c.current(key))
            .and_then(|v| v.data.clone())
    }

    /// Fail every `op` call (on `key`, or on any key) with the given code.
    ///
    /// The error carries no resource, as errors from the SDK adapter don't.
    pub fn fail(&self, op: StoreOp, key: Option<&str>, code: &str, status: u16) {
        self.state.lock().failures.push(InjectedFailure {
            op,
            key: key.map(str::to_string),
            code: code.to_string(),
            status,
        });
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Report this entity tag from every put instead of the content's MD5.
    pub fn report_etag(&self, e_tag: impl Into<String>) {
        self.state.lock().reported_etag = Some(e_tag.into());
    }

    /// Number of `op` calls made so far.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Highest number of puts that were running at the same time.
    pub fn max_concurrent_puts(&self) -> usize {
        self.puts.peak()
    }

    /// Highest number of part uploads that were running at the same time.
    pub fn max_concurrent_parts(&self) -> usize {
        self.parts.peak()
    }

    /// Multipart uploads that were started but neither completed nor aborted.
    pub fn open_uploads(&self) -> usize {
        self.state.lock().uploads.len()
    }

    async fn simulate_write(&self, gauge: &Gauge) {
        gauge.enter();
        if let Some(latency) = self.put_latency {
            tokio::time::sleep(latency).await;
        }
        gauge.exit();
    }

    fn enter(&self, op: StoreOp, container: &str, key: Option<&str>) -> Result<(), BulkError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;

        let state = self.state.lock();
        let injected = state
            .failures
            .iter()
            .find(|f| f.op == op && (f.key.is_none() || f.key.as_deref() == key));
        if let Some(f) = injected {
            return Err(BulkError::Service(
                ServiceError::new(ServiceKind::Storage, op.name(), &f.code, "injected failure")
                    .with_status(f.status),
            ));
        }
        if !state.containers.contains_key(container) {
            return Err(error(
                op,
                "NoSuchBucket",
                "The specified bucket does not exist",
                404,
                container,
                None,
            ));
        }
        Ok(())
    }

    fn page_size(&self, requested: Option<u32>) -> usize {
        requested.unwrap_or(self.page_size).max(1) as usize
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write_object(container: &mut Container, seq: u64, key: &str, data: Option<Bytes>) {
    let versions = container.keys.entry(key.to_string()).or_default();
    if container.versioned {
        versions.push(StoredVersion {
            seq,
            version_id: format!("v{seq}"),
            data,
        });
    } else if data.is_some() {
        *versions = vec![StoredVersion {
            seq,
            version_id: "null".to_string(),
            data,
        }];
    } else {
        container.keys.remove(key);
    }
}

fn error(
    op: StoreOp,
    code: &str,
    message: &str,
    status: u16,
    container: &str,
    key: Option<&str>,
) -> BulkError {
    let resource = match key {
        Some(k) => format!("{container}/{k}"),
        None => container.to_string(),
    };
    BulkError::Service(
        ServiceError::new(ServiceKind::Storage, op.name(), code, message)
            .with_status(status)
            .with_resource(resource),
    )
}

fn no_such_upload(op: StoreOp, container: &str, key: &str) -> BulkError {
    error(
        op,
        "NoSuchUpload",
        "The specified upload does not exist.",
        404,
        container,
        Some(key),
    )
}

/// Entity tag of an assembled multipart object: the MD5 of the parts'
/// binary MD5s, suffixed with the part count.
fn multipart_etag(parts: &[&Bytes]) -> String {
    let digests: Vec<u8> = parts
        .iter()
        .flat_map(|p| crate::transfer::md5_digest(p))
        .collect();
    format!("\"{}-{}\"", crate::transfer::md5_hex(&digests), parts.len())
}

fn matches_prefix(key: &str, prefix: &Option<String>) -> bool {
    prefix.as_deref().map_or(true, |p| key.starts_with(p))
}

#[async_trait]
impl ObjectStoreBackend for InMemoryObjectStore {
    async fn list_objects(&self, request: ListObjectsRequest) -> Result<Page<ObjectSummary>, BulkError> {
        self.enter(StoreOp::ListObjects, &request.container, None)?;
        let limit = self.page_size(request.max_keys);

        let state = self.state.lock();
        let Some(container) = state.containers.get(&request.container) else {
            return Ok(Page::last(Vec::new()));
        };
        let after = request.cursor.as_ref().map(|c| c.marker.as_str());

        let mut matching = container
            .keys
            .iter()
            .filter(|(key, _)| after.map_or(true, |a| key.as_str() > a))
            .filter(|(key, _)| matches_prefix(key, &request.prefix))
            .filter_map(|(key, _)| {
                container.current(key).map(|v| ObjectSummary {
                    key: key.clone(),
                    size: v.data.as_ref().map_or(0, |d| d.len() as u64),
                    e_tag: v.data.as_ref().map(|d| md5_etag(d)),
                })
            });

        let items: Vec<ObjectSummary> = matching.by_ref().take(limit).collect();
        let more = matching.next().is_some();
        Ok(match items.last() {
            Some(last) if more => {
                let cursor = Cursor::new(last.key.clone());
                Page::more(items, cursor)
            }
            _ => Page::last(items),
        })
    }

    async fn list_versions(
        &self,
        request: ListVersionsRequest,
    ) -> Result<Page<VersionRecord>, BulkError> {
        self.enter(StoreOp::ListVersions, &request.container, None)?;
        let limit = self.page_size(request.max_keys);

        let state = self.state.lock();
        let Some(container) = state.containers.get(&request.container) else {
            return Ok(Page::last(Vec::new()));
        };

        // The version marker carries the sequence number of the last entry,
        // so resuming works even after that entry was deleted.
        let after = request.cursor.as_ref().map(|c| {
            let seq = c
                .version_marker
                .as_deref()
                .and_then(|m| m.parse::<u64>().ok())
                .unwrap_or(0);
            (c.marker.as_str(), seq)
        });

        let mut matching = container
            .keys
            .iter()
            .filter(|(key, _)| matches_prefix(key, &request.prefix))
            .flat_map(|(key, versions)| {
                let latest = versions.last().map(|v| v.seq);
                versions
                    .iter()
                    .rev()
                    .map(move |v| (key, v, Some(v.seq) == latest))
            })
            .filter(|(key, v, _)| match after {
                None => true,
                Some((marker, seq)) => key.as_str() > marker || (key.as_str() == marker && v.seq < seq),
            });

        let mut items = Vec::new();
        let mut last_seq = 0;
        for (key, v, is_latest) in matching.by_ref().take(limit) {
            last_seq = v.seq;
            items.push(VersionRecord {
                key: key.clone(),
                version_id: v.version_id.clone(),
                is_delete_marker: v.data.is_none(),
                is_latest,
            });
        }
        let more = matching.next().is_some();
        Ok(match items.last() {
            Some(last) if more => {
                let cursor = Cursor::with_version(last.key.clone(), Some(last_seq.to_string()));
                Page::more(items, cursor)
            }
            _ => Page::last(items),
        })
    }

    async fn delete_object(&self, container: &str, key: &str) -> Result<(), BulkError> {
        self.enter(StoreOp::DeleteObject, container, Some(key))?;
        let mut state = self.state.lock();
        let seq = state.next_seq();
        if let Some(c) = state.containers.get_mut(container) {
            if c.versioned {
                if c.keys.contains_key(key) {
                    write_object(c, seq, key, None);
                }
            } else {
                c.keys.remove(key);
            }
        }
        Ok(())
    }

    async fn delete_version(
        &self,
        container: &str,
        key: &str,
        version_id: &str,
    ) -> Result<(), BulkError> {
        self.enter(StoreOp::DeleteVersion, container, Some(key))?;
        let mut state = self.state.lock();
        if let Some(c) = state.containers.get_mut(container) {
            if let Some(versions) = c.keys.get_mut(key) {
                versions.retain(|v| v.version_id != version_id);
                if versions.is_empty() {
                    c.keys.remove(key);
                }
            }
        }
        Ok(())
    }

    async fn head_object(&self, container: &str, key: &str) -> Result<ObjectMetadata, BulkError> {
        self.enter(StoreOp::HeadObject, container, Some(key))?;
        let state = self.state.lock();
        let current = state.containers.get(container).and_then(|c| c.current(key));
        match current {
            Some(v) => Ok(ObjectMetadata {
                content_length: v.data.as_ref().map_or(0, |d| d.len() as u64),
                e_tag: v.data.as_ref().map(|d| md5_etag(d)),
                version_id: Some(v.version_id.clone()),
            }),
            None => Err(error(StoreOp::HeadObject, "NotFound", "Not Found", 404, container, Some(key))),
        }
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: Bytes,
    ) -> Result<PutObjectOutput, BulkError> {
        self.enter(StoreOp::PutObject, container, Some(key))?;

        self.simulate_write(&self.puts).await;

        let mut state = self.state.lock();
        let seq = state.next_seq();
        let e_tag = state
            .reported_etag
            .clone()
            .unwrap_or_else(|| md5_etag(&body));
        let Some(c) = state.containers.get_mut(container) else {
            return Err(error(StoreOp::PutObject, "NoSuchBucket", "bucket vanished", 404, container, None));
        };
        write_object(c, seq, key, Some(body));
        let version_id = c.current(key).map(|v| v.version_id.clone());
        Ok(PutObjectOutput {
            e_tag: Some(e_tag),
            version_id,
        })
    }

    async fn create_multipart_upload(&self, container: &str, key: &str) -> Result<String, BulkError> {
        self.enter(StoreOp::CreateMultipartUpload, container, Some(key))?;
        let upload_id = Uuid::new_v4().to_string();
        self.state.lock().uploads.insert(
            upload_id.clone(),
            PendingUpload {
                container: container.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        container: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, BulkError> {
        self.enter(StoreOp::UploadPart, container, Some(key))?;
        if !(1..=MAX_PARTS).contains(&part_number) {
            return Err(error(
                StoreOp::UploadPart,
                "InvalidArgument",
                "Part number must be an integer between 1 and 10000, inclusive",
                400,
                container,
                Some(key),
            ));
        }
        self.state.lock().upload(upload_id, StoreOp::UploadPart, container, key)?;

        self.simulate_write(&self.parts).await;

        let e_tag = md5_etag(&body);
        let mut state = self.state.lock();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| no_such_upload(StoreOp::UploadPart, container, key))?;
        upload.parts.insert(part_number, body);
        Ok(e_tag)
    }

    async fn complete_multipart_upload(
        &self,
        container: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<PutObjectOutput, BulkError> {
        const OP: StoreOp = StoreOp::CompleteMultipartUpload;
        self.enter(OP, container, Some(key))?;
        let invalid = |code: &str, message: &str| error(OP, code, message, 400, container, Some(key));

        let mut state = self.state.lock();
        let upload = state.upload(upload_id, OP, container, key)?;
        if parts.is_empty() {
            return Err(invalid("MalformedXML", "The request must name at least one part"));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(invalid("InvalidPartOrder", "The list of parts was not in ascending order"));
        }
        let mut chosen = Vec::with_capacity(parts.len());
        for part in &parts {
            match upload.parts.get(&part.part_number) {
                Some(body) if md5_etag(body) == part.e_tag => chosen.push(body),
                _ => return Err(invalid("InvalidPart", "One or more of the specified parts could not be found")),
            }
        }
        let leading = &chosen[..chosen.len() - 1];
        if leading.iter().any(|p| (p.len() as u64) < MIN_PART_SIZE) {
            return Err(invalid("EntityTooSmall", "Your proposed upload is smaller than the minimum allowed size"));
        }

        let e_tag = multipart_etag(&chosen);
        let mut data = BytesMut::with_capacity(chosen.iter().map(|p| p.len()).sum());
        for part in &chosen {
            data.extend_from_slice(part);
        }
        state.uploads.remove(upload_id);

        let seq = state.next_seq();
        let Some(c) = state.containers.get_mut(container) else {
            return Err(error(OP, "NoSuchBucket", "bucket vanished", 404, container, None));
        };
        write_object(c, seq, key, Some(data.freeze()));
        let version_id = c.current(key).map(|v| v.version_id.clone());
        Ok(PutObjectOutput {
            e_tag: Some(e_tag),
            version_id,
        })
    }

    async fn abort_multipart_upload(
        &self,
        container: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), BulkError> {
        self.enter(StoreOp::AbortMultipartUpload, container, Some(key))?;
        let mut state = self.state.lock();
        state.upload(upload_id, StoreOp::AbortMultipartUpload, container, key)?;
        state.uploads.remove(upload_id);
        Ok(())
    }

    async fn get_object(&self, container: &str, key: &str) -> Result<Bytes, BulkError> {
        self.enter(StoreOp::GetObject, container, Some(key))?;
        self.object(container, key).ok_or_else(|| {
            error(
                StoreOp::GetObject,
                "NoSuchKey",
                "The specified key does not exist.",
                404,
                container,
                Some(key),
            )
        })
    }

    async fn delete_container(&self, container: &str) -> Result<(), BulkError> {
        self.enter(StoreOp::DeleteContainer, container, None)?;
        let mut state = self.state.lock();
        let not_empty = state
            .containers
            .get(container)
            .map_or(false, |c| !c.keys.is_empty());
        if not_empty {
            return Err(error(
                StoreOp::DeleteContainer,
                "BucketNotEmpty",
                "The bucket you tried to delete is not empty",
                409,
                container,
                None,
            ));
        }
        state.containers.remove(container);
        Ok(())
    }
}
