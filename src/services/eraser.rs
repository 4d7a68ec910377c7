//! Container teardown.

use super::storage::{object_stream, version_stream, StorageService};
use crate::error::BulkError;
use crate::types::EraseReport;
use futures::TryStreamExt;
use std::sync::atomic::AtomicU64;
use tracing::{debug, info, instrument};

/// Empties and deletes containers, versioned or not.
///
/// Emptying runs in two phases: every current object is deleted, then every
/// version record (including the delete markers the first phase may have
/// left behind) is deleted. Each phase walks its listing lazily and deletes
/// the page it holds before fetching the next. The first failed delete
/// aborts the run; nothing is rolled back.
pub struct BulkEraser {
    storage: StorageService,
}

impl BulkEraser {
    /// Create a new eraser over a storage service.
    pub fn new(storage: StorageService) -> Self {
        Self { storage }
    }

    /// Delete every object and every version in `container`.
    ///
    /// An already-empty container costs one list call per phase.
    #[instrument(skip(self), fields(container = %container))]
    pub async fn empty_container(&self, container: &str) -> Result<EraseReport, BulkError> {
        let store = self.storage.store();
        let page_size = self.storage.page_size();
        let pages = AtomicU64::new(0);
        let mut report = EraseReport::default();

        {
            let objects = object_stream(store, container, None, page_size, Some(&pages));
            futures::pin_mut!(objects);
            while let Some(object) = objects.try_next().await? {
                store
                    .delete_object(container, &object.key)
                    .await
                    .map_err(|e| e.with_resource(format!("{container}/{}", object.key)))?;
                report.objects_deleted += 1;
            }
        }
        debug!(deleted = report.objects_deleted, "Deleted current objects");

        {
            let versions = version_stream(store, container, page_size, Some(&pages));
            futures::pin_mut!(versions);
            while let Some(version) = versions.try_next().await? {
                store
                    .delete_version(container, &version.key, &version.version_id)
                    .await
                    .map_err(|e| {
                        e.with_resource(format!(
                            "{container}/{}?versionId={}",
                            version.key, version.version_id
                        ))
                    })?;
                report.versions_deleted += 1;
            }
        }

        report.pages_listed = pages.into_inner();
        info!(
            objects = report.objects_deleted,
            versions = report.versions_deleted,
            pages = report.pages_listed,
            "Container emptied"
        );
        Ok(report)
    }

    /// Empty `container`, then delete it.
    #[instrument(skip(self), fields(container = %container))]
    pub async fn delete_container(&self, container: &str) -> Result<EraseReport, BulkError> {
        let report = self.empty_container(container).await?;
        self.storage
            .store()
            .delete_container(container)
            .await
            .map_err(|e| e.with_resource(container))?;
        info!("Container deleted");
        Ok(report)
    }
}
