//! Service backends.
//!
//! Each trait is the narrow slice of a remote API that the bulk services
//! consume. Implementations own the wire protocol: the `aws-sdk` feature
//! provides one over the official SDK, and [`crate::mocks`] provides
//! in-memory ones for tests.
//!
//! Implementations must report failures as [`BulkError`]; a "does not exist"
//! answer must be a [`crate::error::ServiceError`] that classifies as not
//! found (404 status or a not-found code), so the services can turn it into
//! an absent value.

#[cfg(feature = "aws-sdk")]
pub mod aws;

use crate::error::BulkError;
use crate::types::*;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Object storage operations.
#[async_trait]
pub trait ObjectStoreBackend: Send + Sync {
    /// List one page of current objects.
    async fn list_objects(&self, request: ListObjectsRequest) -> Result<Page<ObjectSummary>, BulkError>;

    /// List one page of version records, delete markers included.
    async fn list_versions(
        &self,
        request: ListVersionsRequest,
    ) -> Result<Page<VersionRecord>, BulkError>;

    /// Delete the current version of an object. Absent keys succeed.
    async fn delete_object(&self, container: &str, key: &str) -> Result<(), BulkError>;

    /// Delete one version record. Absent versions succeed.
    async fn delete_version(
        &self,
        container: &str,
        key: &str,
        version_id: &str,
    ) -> Result<(), BulkError>;

    /// Fetch object metadata.
    async fn head_object(&self, container: &str, key: &str) -> Result<ObjectMetadata, BulkError>;

    /// Store an object.
    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: Bytes,
    ) -> Result<PutObjectOutput, BulkError>;

    /// Start a multipart upload, returning its upload ID.
    async fn create_multipart_upload(&self, container: &str, key: &str) -> Result<String, BulkError>;

    /// Store one part of a multipart upload, returning the part's ETag.
    async fn upload_part(
        &self,
        container: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, BulkError>;

    /// Assemble the uploaded parts into the object. `parts` are in
    /// ascending part-number order.
    async fn complete_multipart_upload(
        &self,
        container: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<PutObjectOutput, BulkError>;

    /// Discard a multipart upload and its parts.
    async fn abort_multipart_upload(
        &self,
        container: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), BulkError>;

    /// Fetch an object's content.
    async fn get_object(&self, container: &str, key: &str) -> Result<Bytes, BulkError>;

    /// Delete an empty container.
    async fn delete_container(&self, container: &str) -> Result<(), BulkError>;
}

/// Message queue operations.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Send one message, returning its ID.
    async fn send_message(
        &self,
        queue_url: &str,
        body: &str,
        delay: Option<Duration>,
    ) -> Result<String, BulkError>;

    /// Send up to ten messages in one call.
    ///
    /// `Err` means the call itself failed; per-entry rejections come back in
    /// the `Ok` vector.
    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: Vec<BatchEntry>,
    ) -> Result<Vec<BatchEntryFailure>, BulkError>;

    /// Receive messages. An empty vector is a normal outcome.
    async fn receive_messages(&self, request: ReceiveRequest) -> Result<Vec<Message>, BulkError>;

    /// Change the visibility timeout of one delivery.
    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
        timeout: Duration,
    ) -> Result<(), BulkError>;

    /// Delete one delivered message.
    async fn delete_message(&self, queue_url: &str, receipt: &ReceiptHandle) -> Result<(), BulkError>;
}

/// Identity catalog operations.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// List one page of managed policies.
    async fn list_policies(&self, cursor: Option<Cursor>) -> Result<Page<PolicySummary>, BulkError>;

    /// List one page of server certificates.
    async fn list_server_certificates(
        &self,
        cursor: Option<Cursor>,
    ) -> Result<Page<ServerCertificateSummary>, BulkError>;

    /// List one page of policy ARNs attached to a role.
    async fn list_attached_role_policies(
        &self,
        role_name: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<String>, BulkError>;

    /// Fetch a role.
    async fn get_role(&self, role_name: &str) -> Result<RoleSummary, BulkError>;

    /// Fetch an instance profile.
    async fn get_instance_profile(&self, name: &str) -> Result<InstanceProfileSummary, BulkError>;

    /// List the account's aliases.
    async fn list_account_aliases(&self) -> Result<Vec<String>, BulkError>;
}
