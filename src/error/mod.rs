//! Error types for the bulk operations crate.
//!
//! Errors are grouped by where they originate: configuration, the remote
//! service, the network, malformed responses, and the transfer machinery.
//! "Not found" is a classification of [`ServiceError`], not a variant of its
//! own: lookups in this crate turn it into an absent value.

mod mapping;

pub use mapping::{is_not_found_code, map_error_code};

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for bulk operations.
#[derive(Debug, Error)]
pub enum BulkError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Errors reported by the remote service.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Network and transport errors.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Response shape errors.
    #[error("Response error: {0}")]
    Response(#[from] ResponseError),

    /// Transfer and worker pool errors.
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),
}

impl BulkError {
    /// Returns true if the service reported that the target does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            BulkError::Service(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Returns the HTTP status code reported by the service, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BulkError::Service(e) => e.status,
            _ => None,
        }
    }

    /// Returns the provider error code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            BulkError::Service(e) => Some(e.code.as_str()),
            _ => None,
        }
    }

    /// Returns the request ID reported by the service, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            BulkError::Service(e) => e.request_id.as_deref(),
            _ => None,
        }
    }

    /// Wrap the error with the resource the failing call was acting on.
    ///
    /// Only service errors carry a resource; other categories already
    /// describe themselves.
    pub fn with_resource(self, resource: impl Into<String>) -> Self {
        match self {
            BulkError::Service(mut e) => {
                if e.resource.is_none() {
                    e.resource = Some(resource.into());
                }
                BulkError::Service(e)
            }
            other => other,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Invalid configuration value.
    #[error("Invalid configuration for '{field}': {message}")]
    InvalidConfiguration {
        /// The configuration field.
        field: String,
        /// Error message.
        message: String,
    },

    /// Invalid endpoint URL.
    #[error("Invalid endpoint URL '{url}': {details}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Error details.
        details: String,
    },

    /// Credentials were only partially provided.
    #[error("Incomplete credentials: {message}")]
    IncompleteCredentials {
        /// Error message.
        message: String,
    },
}

/// Which remote service produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Object storage.
    Storage,
    /// Message queue.
    Queue,
    /// Identity and access management.
    Identity,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::Storage => write!(f, "s3"),
            ServiceKind::Queue => write!(f, "sqs"),
            ServiceKind::Identity => write!(f, "iam"),
        }
    }
}

/// An error response returned by the remote service.
#[derive(Debug, Error)]
#[error("{service} {operation} failed{}: {code}: {message}", describe_resource(.resource))]
pub struct ServiceError {
    /// Service that rejected the call.
    pub service: ServiceKind,
    /// Operation name (e.g. "DeleteObject").
    pub operation: String,
    /// Provider error code (e.g. "NoSuchKey").
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// HTTP status, when known.
    pub status: Option<u16>,
    /// Resource the call acted on (container/key, queue URL, role name).
    pub resource: Option<String>,
    /// Provider request ID.
    pub request_id: Option<String>,
}

impl ServiceError {
    /// Create a new service error.
    pub fn new(
        service: ServiceKind,
        operation: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service,
            operation: operation.into(),
            code: code.into(),
            message: message.into(),
            status: None,
            resource: None,
            request_id: None,
        }
    }

    /// Set the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the resource.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Set the request ID.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns true if the error means "the target does not exist".
    ///
    /// A 404 status counts even when the code is unfamiliar; HEAD responses
    /// carry no body and therefore no code.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404) || is_not_found_code(&self.code)
    }
}

fn describe_resource(resource: &Option<String>) -> String {
    match resource {
        Some(r) => format!(" for '{r}'"),
        None => String::new(),
    }
}

/// Network and transport errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Connection failed.
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        /// Error message.
        message: String,
    },

    /// Request timed out.
    #[error("Request timed out: {message}")]
    Timeout {
        /// Error message.
        message: String,
    },

    /// Any other dispatch failure from the client library.
    #[error("Dispatch failure: {message}")]
    Dispatch {
        /// Error message.
        message: String,
    },
}

/// Response shape errors.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// A page claimed more results but carried no cursor.
    #[error("Truncated page from {operation} has no continuation cursor")]
    MissingCursor {
        /// The list operation.
        operation: String,
    },

    /// Missing required field.
    #[error("Missing required field '{field}' in {operation} response")]
    MissingField {
        /// The list operation.
        operation: String,
        /// The missing field name.
        field: String,
    },

    /// A batch response referred to an entry that was not in the request.
    #[error("{operation} reported a failure for unknown entry '{id}'")]
    UnknownEntryId {
        /// The batch operation.
        operation: String,
        /// The entry ID as reported.
        id: String,
    },

    /// The response body could not be read.
    #[error("Failed to read response body: {message}")]
    Body {
        /// Error message.
        message: String,
    },
}

/// Transfer and worker pool errors.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The coordinator no longer accepts work.
    #[error("Transfer coordinator has been shut down")]
    ShutDown,

    /// The transfer task was aborted before it finished.
    #[error("Transfer of '{key}' was aborted")]
    Aborted {
        /// The object key.
        key: String,
    },

    /// The transfer task panicked.
    #[error("Transfer of '{key}' panicked")]
    Panicked {
        /// The object key.
        key: String,
    },

    /// A reader produced a different number of bytes than declared.
    #[error("Incomplete body: expected {expected} bytes, received {received} bytes")]
    IncompleteBody {
        /// Declared size.
        expected: u64,
        /// Received size.
        received: u64,
    },

    /// The service computed a different checksum than we did.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Locally computed checksum.
        expected: String,
        /// Checksum reported by the service.
        actual: String,
    },

    /// The source needs more parts than a multipart upload allows.
    #[error("Source needs more than {limit} parts of {part_size} bytes")]
    TooManyParts {
        /// Part count limit.
        limit: u32,
        /// Configured part size.
        part_size: u64,
    },

    /// Local file or stream I/O failed.
    #[error("I/O error on {}: {source}", describe_path(.path))]
    Io {
        /// The local path, if the source was a file.
        path: Option<PathBuf>,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

fn describe_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "stream".to_string(),
    }
}

impl TransferError {
    /// Wrap an I/O error on a local file.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Io {
            path: Some(path.into()),
            source,
        }
    }

    /// Wrap an I/O error on a stream.
    pub fn stream(source: std::io::Error) -> Self {
        TransferError::Io { path: None, source }
    }
}
