//! Backends over the official AWS SDK.
//!
//! Enabled with the `aws-sdk` feature. Clients are built from a shared
//! [`aws_config::SdkConfig`] so region, endpoint and credentials come from
//! one place; path-style addressing is forced when a custom endpoint is set.

use super::{IdentityBackend, ObjectStoreBackend, QueueBackend};
use crate::config::BulkConfig;
use crate::error::{
    map_error_code, BulkError, ConfigurationError, NetworkError, ResponseError, ServiceKind,
};
use crate::types::*;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_sqs::types::builders::SendMessageBatchRequestEntryBuilder;
use aws_sdk_sqs::types::SendMessageBatchRequestEntry;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

/// Load the shared SDK configuration for `config`.
///
/// Explicit credentials win; otherwise the SDK's default provider chain
/// applies.
pub async fn load_sdk_config(config: &BulkConfig) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint.as_str());
    }
    if let Some(credentials) = &config.credentials {
        loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            credentials.session_token().map(str::to_string),
            None,
            "bulk-config",
        ));
    }
    debug!(region = %config.region, custom_endpoint = config.endpoint.is_some(), "Loaded SDK configuration");
    loader.load().await
}

/// Translate an SDK error into the crate's error categories.
fn from_sdk<E>(service: ServiceKind, operation: &str, err: SdkError<E, HttpResponse>) -> BulkError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(_) => {
            let status = err.raw_response().map(|r| r.status().as_u16());
            let code = err.code().unwrap_or("Unknown").to_string();
            let message = err.message().unwrap_or_default().to_string();
            map_error_code(service, operation, &code, &message, status)
        }
        SdkError::TimeoutError(_) => NetworkError::Timeout { message: detail }.into(),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            NetworkError::Timeout { message: detail }.into()
        }
        SdkError::DispatchFailure(failure) if failure.is_io() => {
            NetworkError::ConnectionFailed { message: detail }.into()
        }
        SdkError::ResponseError(_) => ResponseError::Body { message: detail }.into(),
        _ => NetworkError::Dispatch { message: detail }.into(),
    }
}

/// Required members come back bare, optional ones as `Option`.
trait FieldText {
    fn text(self) -> String;
}

impl FieldText for &str {
    fn text(self) -> String {
        self.to_string()
    }
}

impl FieldText for Option<&str> {
    fn text(self) -> String {
        self.unwrap_or_default().to_string()
    }
}

trait Flag {
    fn flag(self) -> bool;
}

impl Flag for bool {
    fn flag(self) -> bool {
        self
    }
}

impl Flag for Option<bool> {
    fn flag(self) -> bool {
        self.unwrap_or(false)
    }
}

fn secs(d: Duration) -> i32 {
    i32::try_from(ceil_seconds(d)).unwrap_or(i32::MAX)
}

fn part_index(part_number: u32) -> i32 {
    i32::try_from(part_number).unwrap_or(i32::MAX)
}

fn batch_entry(entry: BatchEntry) -> Result<SendMessageBatchRequestEntry, ConfigurationError> {
    finish_entry(
        SendMessageBatchRequestEntry::builder()
            .id(entry.id)
            .message_body(entry.body),
    )
}

/// A missing required member is a caller error.
fn finish_entry(
    builder: SendMessageBatchRequestEntryBuilder,
) -> Result<SendMessageBatchRequestEntry, ConfigurationError> {
    builder
        .build()
        .map_err(|err| ConfigurationError::InvalidConfiguration {
            field: "batch entry".to_string(),
            message: err.to_string(),
        })
}

fn iam_page<T>(items: Vec<T>, truncated: bool, marker: Option<&str>) -> Page<T> {
    match marker {
        Some(m) if truncated => Page::more(items, Cursor::new(m)),
        _ => Page {
            items,
            next_cursor: None,
            truncated,
        },
    }
}

/// [`ObjectStoreBackend`] over `aws-sdk-s3`.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: aws_sdk_s3::Client,
}

impl S3Backend {
    /// Wrap an existing client.
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Build a client from shared SDK configuration.
    pub fn from_sdk_config(sdk_config: &SdkConfig, path_style: bool) -> Self {
        let conf = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(path_style)
            .build();
        Self::new(aws_sdk_s3::Client::from_conf(conf))
    }
}

const S3: ServiceKind = ServiceKind::Storage;

#[async_trait]
impl ObjectStoreBackend for S3Backend {
    async fn list_objects(&self, request: ListObjectsRequest) -> Result<Page<ObjectSummary>, BulkError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&request.container)
            .set_prefix(request.prefix)
            .set_continuation_token(request.cursor.map(|c| c.marker))
            .set_max_keys(request.max_keys.map(|n| n as i32))
            .send()
            .await
            .map_err(|e| from_sdk(S3, "ListObjectsV2", e))?;

        let items = resp
            .contents()
            .iter()
            .map(|o| ObjectSummary {
                key: o.key().text(),
                size: o.size().unwrap_or(0).max(0) as u64,
                e_tag: o.e_tag().map(str::to_string),
            })
            .collect();
        Ok(Page {
            items,
            next_cursor: resp.next_continuation_token().map(Cursor::new),
            truncated: resp.is_truncated().flag(),
        })
    }

    async fn list_versions(
        &self,
        request: ListVersionsRequest,
    ) -> Result<Page<VersionRecord>, BulkError> {
        let (key_marker, version_marker) = match request.cursor {
            Some(c) => (Some(c.marker), c.version_marker),
            None => (None, None),
        };
        let resp = self
            .client
            .list_object_versions()
            .bucket(&request.container)
            .set_prefix(request.prefix)
            .set_key_marker(key_marker)
            .set_version_id_marker(version_marker)
            .set_max_keys(request.max_keys.map(|n| n as i32))
            .send()
            .await
            .map_err(|e| from_sdk(S3, "ListObjectVersions", e))?;

        let versions = resp.versions().iter().map(|v| VersionRecord {
            key: v.key().text(),
            version_id: v.version_id().unwrap_or("null").to_string(),
            is_delete_marker: false,
            is_latest: v.is_latest().flag(),
        });
        let markers = resp.delete_markers().iter().map(|m| VersionRecord {
            key: m.key().text(),
            version_id: m.version_id().unwrap_or("null").to_string(),
            is_delete_marker: true,
            is_latest: m.is_latest().flag(),
        });
        let items = versions.chain(markers).collect();

        let truncated = resp.is_truncated().flag();
        let next_cursor = resp.next_key_marker().map(|key| {
            Cursor::with_version(key, resp.next_version_id_marker().map(str::to_string))
        });
        Ok(Page {
            items,
            next_cursor: next_cursor.filter(|_| truncated),
            truncated,
        })
    }

    async fn delete_object(&self, container: &str, key: &str) -> Result<(), BulkError> {
        self.client
            .delete_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| from_sdk(S3, "DeleteObject", e))?;
        Ok(())
    }

    async fn delete_version(
        &self,
        container: &str,
        key: &str,
        version_id: &str,
    ) -> Result<(), BulkError> {
        self.client
            .delete_object()
            .bucket(container)
            .key(key)
            .version_id(version_id)
            .send()
            .await
            .map_err(|e| from_sdk(S3, "DeleteObject", e))?;
        Ok(())
    }

    async fn head_object(&self, container: &str, key: &str) -> Result<ObjectMetadata, BulkError> {
        let resp = self
            .client
            .head_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| from_sdk(S3, "HeadObject", e))?;
        Ok(ObjectMetadata {
            content_length: resp.content_length().unwrap_or(0).max(0) as u64,
            e_tag: resp.e_tag().map(str::to_string),
            version_id: resp.version_id().map(str::to_string),
        })
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: Bytes,
    ) -> Result<PutObjectOutput, BulkError> {
        let resp = self
            .client
            .put_object()
            .bucket(container)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| from_sdk(S3, "PutObject", e))?;
        Ok(PutObjectOutput {
            e_tag: resp.e_tag().map(str::to_string),
            version_id: resp.version_id().map(str::to_string),
        })
    }

    async fn create_multipart_upload(&self, container: &str, key: &str) -> Result<String, BulkError> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| from_sdk(S3, "CreateMultipartUpload", e))?;
        resp.upload_id().map(str::to_string).ok_or_else(|| {
            ResponseError::MissingField {
                operation: "CreateMultipartUpload".to_string(),
                field: "UploadId".to_string(),
            }
            .into()
        })
    }

    async fn upload_part(
        &self,
        container: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, BulkError> {
        let resp = self
            .client
            .upload_part()
            .bucket(container)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_index(part_number))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| from_sdk(S3, "UploadPart", e))?;
        resp.e_tag().map(str::to_string).ok_or_else(|| {
            ResponseError::MissingField {
                operation: "UploadPart".to_string(),
                field: "ETag".to_string(),
            }
            .into()
        })
    }

    async fn complete_multipart_upload(
        &self,
        container: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<PutObjectOutput, BulkError> {
        let parts = parts
            .into_iter()
            .map(|p| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part_index(p.part_number))
                    .e_tag(p.e_tag)
                    .build()
            })
            .collect();
        let upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        let resp = self
            .client
            .complete_multipart_upload()
            .bucket(container)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| from_sdk(S3, "CompleteMultipartUpload", e))?;
        Ok(PutObjectOutput {
            e_tag: resp.e_tag().map(str::to_string),
            version_id: resp.version_id().map(str::to_string),
        })
    }

    async fn abort_multipart_upload(
        &self,
        container: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), BulkError> {
        self.client
            .abort_multipart_upload()
            .bucket(container)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| from_sdk(S3, "AbortMultipartUpload", e))?;
        Ok(())
    }

    async fn get_object(&self, container: &str, key: &str) -> Result<Bytes, BulkError> {
        let resp = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| from_sdk(S3, "GetObject", e))?;
        let data = resp.body.collect().await.map_err(|e| ResponseError::Body {
            message: e.to_string(),
        })?;
        Ok(data.into_bytes())
    }

    async fn delete_container(&self, container: &str) -> Result<(), BulkError> {
        self.client
            .delete_bucket()
            .bucket(container)
            .send()
            .await
            .map_err(|e| from_sdk(S3, "DeleteBucket", e))?;
        Ok(())
    }
}

/// [`QueueBackend`] over `aws-sdk-sqs`.
#[derive(Debug, Clone)]
pub struct SqsBackend {
    client: aws_sdk_sqs::Client,
}

impl SqsBackend {
    /// Wrap an existing client.
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }

    /// Build a client from shared SDK configuration.
    pub fn from_sdk_config(sdk_config: &SdkConfig) -> Self {
        Self::new(aws_sdk_sqs::Client::new(sdk_config))
    }
}

const SQS: ServiceKind = ServiceKind::Queue;

#[async_trait]
impl QueueBackend for SqsBackend {
    async fn send_message(
        &self,
        queue_url: &str,
        body: &str,
        delay: Option<Duration>,
    ) -> Result<String, BulkError> {
        let resp = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .set_delay_seconds(delay.map(secs))
            .send()
            .await
            .map_err(|e| from_sdk(SQS, "SendMessage", e))?;
        resp.message_id().map(str::to_string).ok_or_else(|| {
            ResponseError::MissingField {
                operation: "SendMessage".to_string(),
                field: "MessageId".to_string(),
            }
            .into()
        })
    }

    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: Vec<BatchEntry>,
    ) -> Result<Vec<BatchEntryFailure>, BulkError> {
        let entries = entries
            .into_iter()
            .map(batch_entry)
            .collect::<Result<Vec<_>, _>>()?;

        let resp = self
            .client
            .send_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| from_sdk(SQS, "SendMessageBatch", e))?;

        Ok(resp
            .failed()
            .iter()
            .map(|f| BatchEntryFailure {
                id: f.id().text(),
                code: f.code().text(),
                message: f.message().text(),
                sender_fault: f.sender_fault().flag(),
            })
            .collect())
    }

    async fn receive_messages(&self, request: ReceiveRequest) -> Result<Vec<Message>, BulkError> {
        let resp = self
            .client
            .receive_message()
            .queue_url(&request.queue_url)
            .max_number_of_messages(request.max_messages as i32)
            .set_wait_time_seconds(request.wait.map(secs))
            .send()
            .await
            .map_err(|e| from_sdk(SQS, "ReceiveMessage", e))?;

        Ok(resp
            .messages()
            .iter()
            .map(|m| Message {
                message_id: m.message_id().text(),
                body: m.body().text(),
                receipt_handle: ReceiptHandle::new(m.receipt_handle().text()),
            })
            .collect())
    }

    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
        timeout: Duration,
    ) -> Result<(), BulkError> {
        self.client
            .change_message_visibility()
            .queue_url(queue_url)
            .receipt_handle(receipt.as_str())
            .visibility_timeout(secs(timeout))
            .send()
            .await
            .map_err(|e| from_sdk(SQS, "ChangeMessageVisibility", e))?;
        Ok(())
    }

    async fn delete_message(&self, queue_url: &str, receipt: &ReceiptHandle) -> Result<(), BulkError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt.as_str())
            .send()
            .await
            .map_err(|e| from_sdk(SQS, "DeleteMessage", e))?;
        Ok(())
    }
}

/// [`IdentityBackend`] over `aws-sdk-iam`.
#[derive(Debug, Clone)]
pub struct IamBackend {
    client: aws_sdk_iam::Client,
}

impl IamBackend {
    /// Wrap an existing client.
    pub fn new(client: aws_sdk_iam::Client) -> Self {
        Self { client }
    }

    /// Build a client from shared SDK configuration.
    pub fn from_sdk_config(sdk_config: &SdkConfig) -> Self {
        Self::new(aws_sdk_iam::Client::new(sdk_config))
    }
}

const IAM: ServiceKind = ServiceKind::Identity;

#[async_trait]
impl IdentityBackend for IamBackend {
    async fn list_policies(&self, cursor: Option<Cursor>) -> Result<Page<PolicySummary>, BulkError> {
        let resp = self
            .client
            .list_policies()
            .set_marker(cursor.map(|c| c.marker))
            .send()
            .await
            .map_err(|e| from_sdk(IAM, "ListPolicies", e))?;
        let items = resp
            .policies()
            .iter()
            .map(|p| PolicySummary {
                name: p.policy_name().text(),
                arn: p.arn().text(),
            })
            .collect();
        Ok(iam_page(items, resp.is_truncated().flag(), resp.marker()))
    }

    async fn list_server_certificates(
        &self,
        cursor: Option<Cursor>,
    ) -> Result<Page<ServerCertificateSummary>, BulkError> {
        let resp = self
            .client
            .list_server_certificates()
            .set_marker(cursor.map(|c| c.marker))
            .send()
            .await
            .map_err(|e| from_sdk(IAM, "ListServerCertificates", e))?;
        let items = resp
            .server_certificate_metadata_list()
            .iter()
            .map(|c| ServerCertificateSummary {
                name: c.server_certificate_name().text(),
                arn: c.arn().text(),
            })
            .collect();
        Ok(iam_page(items, resp.is_truncated().flag(), resp.marker()))
    }

    async fn list_attached_role_policies(
        &self,
        role_name: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<String>, BulkError> {
        let resp = self
            .client
            .list_attached_role_policies()
            .role_name(role_name)
            .set_marker(cursor.map(|c| c.marker))
            .send()
            .await
            .map_err(|e| from_sdk(IAM, "ListAttachedRolePolicies", e).with_resource(role_name))?;
        let items = resp
            .attached_policies()
            .iter()
            .filter_map(|p| p.policy_arn().map(str::to_string))
            .collect();
        Ok(iam_page(items, resp.is_truncated().flag(), resp.marker()))
    }

    async fn get_role(&self, role_name: &str) -> Result<RoleSummary, BulkError> {
        let resp = self
            .client
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| from_sdk(IAM, "GetRole", e).with_resource(role_name))?;
        let role = resp.role().ok_or_else(|| ResponseError::MissingField {
            operation: "GetRole".to_string(),
            field: "Role".to_string(),
        })?;
        Ok(RoleSummary {
            name: role.role_name().text(),
            arn: role.arn().text(),
        })
    }

    async fn get_instance_profile(&self, name: &str) -> Result<InstanceProfileSummary, BulkError> {
        let resp = self
            .client
            .get_instance_profile()
            .instance_profile_name(name)
            .send()
            .await
            .map_err(|e| from_sdk(IAM, "GetInstanceProfile", e).with_resource(name))?;
        let profile = resp.instance_profile().ok_or_else(|| ResponseError::MissingField {
            operation: "GetInstanceProfile".to_string(),
            field: "InstanceProfile".to_string(),
        })?;
        Ok(InstanceProfileSummary {
            name: profile.instance_profile_name().text(),
            arn: profile.arn().text(),
            roles: profile.roles().iter().map(|r| r.role_name().text()).collect(),
        })
    }

    async fn list_account_aliases(&self) -> Result<Vec<String>, BulkError> {
        let resp = self
            .client
            .list_account_aliases()
            .send()
            .await
            .map_err(|e| from_sdk(IAM, "ListAccountAliases", e))?;
        Ok(resp.account_aliases().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_rounds_up() {
        assert_eq!(secs(Duration::from_millis(500)), 1);
        assert_eq!(secs(Duration::from_millis(1500)), 2);
        assert_eq!(secs(Duration::from_secs(20)), 20);
        assert_eq!(secs(Duration::ZERO), 0);
    }

    #[test]
    fn test_batch_entry_keeps_id_and_body() {
        let entry = batch_entry(BatchEntry {
            id: "3".to_string(),
            body: "payload".to_string(),
        })
        .unwrap();
        assert_eq!(entry.id(), "3");
        assert_eq!(entry.message_body(), "payload");
    }

    #[test]
    fn test_batch_entry_error_is_configuration() {
        let err: BulkError = finish_entry(SendMessageBatchRequestEntry::builder().id("0"))
            .unwrap_err()
            .into();
        assert!(matches!(err, BulkError::Configuration(_)));
        assert!(err.code().is_none());
    }
}
