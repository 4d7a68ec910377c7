//! Object storage types.

use super::Cursor;
use serde::{Deserialize, Serialize};

/// A current object in a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Entity tag, if reported.
    pub e_tag: Option<String>,
}

/// A version or delete-marker entry in a versioned container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Object key.
    pub key: String,
    /// Version identifier ("null" for objects written before versioning).
    pub version_id: String,
    /// Whether this entry is a delete marker.
    pub is_delete_marker: bool,
    /// Whether this entry is the current version of the key.
    pub is_latest: bool,
}

/// Parameters for one ListObjects call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    /// Container name.
    pub container: String,
    /// Key prefix filter.
    pub prefix: Option<String>,
    /// Where to resume.
    pub cursor: Option<Cursor>,
    /// Requested page size.
    pub max_keys: Option<u32>,
}

impl ListObjectsRequest {
    /// Create a request for the first page of `container`.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            ..Default::default()
        }
    }
}

/// Parameters for one ListObjectVersions call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListVersionsRequest {
    /// Container name.
    pub container: String,
    /// Key prefix filter.
    pub prefix: Option<String>,
    /// Where to resume.
    pub cursor: Option<Cursor>,
    /// Requested page size.
    pub max_keys: Option<u32>,
}

impl ListVersionsRequest {
    /// Create a request for the first page of `container`.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            ..Default::default()
        }
    }
}

/// Result of a HEAD call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Content length in bytes.
    pub content_length: u64,
    /// Entity tag.
    pub e_tag: Option<String>,
    /// Version identifier, in versioned containers.
    pub version_id: Option<String>,
}

/// Result of a PUT call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutObjectOutput {
    /// Entity tag of the stored object.
    pub e_tag: Option<String>,
    /// Version identifier, in versioned containers.
    pub version_id: Option<String>,
}

/// Summary of a container teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraseReport {
    /// Current objects deleted.
    pub objects_deleted: u64,
    /// Version records (including delete markers) deleted.
    pub versions_deleted: u64,
    /// List calls issued across both phases.
    pub pages_listed: u64,
}

/// Smallest part the service accepts, except for the last part of an upload.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Most parts a multipart upload may have.
pub const MAX_PARTS: u32 = 10_000;

/// A stored part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// Entity tag the service returned for the part.
    pub e_tag: String,
}
