//! Container listing and existence checks.

use crate::backend::ObjectStoreBackend;
use crate::config::BulkConfig;
use crate::error::BulkError;
use crate::pagination::paginate;
use crate::types::*;
use futures::{Stream, TryStreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Read-side operations on a container.
pub struct StorageService {
    config: Arc<BulkConfig>,
    store: Arc<dyn ObjectStoreBackend>,
}

impl StorageService {
    /// Create a new storage service.
    pub fn new(config: Arc<BulkConfig>, store: Arc<dyn ObjectStoreBackend>) -> Self {
        Self { config, store }
    }

    /// Stream every current object under `prefix`.
    pub fn objects<'a>(
        &'a self,
        container: &str,
        prefix: Option<&str>,
    ) -> impl Stream<Item = Result<ObjectSummary, BulkError>> + 'a {
        object_stream(
            &self.store,
            container,
            prefix,
            self.config.list_page_size,
            None,
        )
    }

    /// Stream every version record, delete markers included.
    pub fn versions<'a>(
        &'a self,
        container: &str,
    ) -> impl Stream<Item = Result<VersionRecord, BulkError>> + 'a {
        version_stream(&self.store, container, self.config.list_page_size, None)
    }

    /// Collect the keys of all current objects under `prefix`.
    #[instrument(skip(self), fields(container = %container))]
    pub async fn list_keys(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, BulkError> {
        let keys: Vec<String> = self
            .objects(container, prefix)
            .map_ok(|object| object.key)
            .try_collect()
            .await?;
        debug!(count = keys.len(), "Listed keys");
        Ok(keys)
    }

    /// Whether `key` exists.
    ///
    /// Only a not-found answer maps to `false`; access and network failures
    /// propagate.
    #[instrument(skip(self), fields(container = %container, key = %key))]
    pub async fn exists(&self, container: &str, key: &str) -> Result<bool, BulkError> {
        match self.store.head_object(container, key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.with_resource(format!("{container}/{key}"))),
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn ObjectStoreBackend> {
        &self.store
    }

    pub(crate) fn page_size(&self) -> Option<u32> {
        self.config.list_page_size
    }
}

/// Lazily list current objects, counting list calls into `pages`.
pub(crate) fn object_stream<'a>(
    store: &'a Arc<dyn ObjectStoreBackend>,
    container: &str,
    prefix: Option<&str>,
    page_size: Option<u32>,
    pages: Option<&'a AtomicU64>,
) -> impl Stream<Item = Result<ObjectSummary, BulkError>> + 'a {
    let container = container.to_string();
    let prefix = prefix.map(str::to_string);
    paginate("ListObjectsV2", move |cursor| {
        if let Some(pages) = pages {
            pages.fetch_add(1, Ordering::Relaxed);
        }
        let request = ListObjectsRequest {
            container: container.clone(),
            prefix: prefix.clone(),
            cursor,
            max_keys: page_size,
        };
        let resource = container.clone();
        async move {
            store
                .list_objects(request)
                .await
                .map_err(|e| e.with_resource(resource))
        }
    })
}

/// Lazily list version records, counting list calls into `pages`.
pub(crate) fn version_stream<'a>(
    store: &'a Arc<dyn ObjectStoreBackend>,
    container: &str,
    page_size: Option<u32>,
    pages: Option<&'a AtomicU64>,
) -> impl Stream<Item = Result<VersionRecord, BulkError>> + 'a {
    let container = container.to_string();
    paginate("ListObjectVersions", move |cursor| {
        if let Some(pages) = pages {
            pages.fetch_add(1, Ordering::Relaxed);
        }
        let request = ListVersionsRequest {
            container: container.clone(),
            prefix: None,
            cursor,
            max_keys: page_size,
        };
        let resource = container.clone();
        async move {
            store
                .list_versions(request)
                .await
                .map_err(|e| e.with_resource(resource))
        }
    })
}
