//! AWS Bulk Operations
//!
//! Bulk and paginated operations over object storage, message queues and
//! identity catalogs: container teardown, chunked batch sends, long-poll
//! receives, name-to-ARN lookups and transfers on a bounded worker pool.
//!
//! # Features
//!
//! - **Lazy pagination**: catalogs are streamed one page at a time
//! - **Container teardown**: objects, versions and delete markers
//! - **Batching**: any number of messages, ten per call, failures as data
//! - **Transfers**: blocking or handle-based uploads on a bounded pool,
//!   multipart above a size threshold
//! - **Absent-as-value lookups**: missing resources are `None`, not errors
//!
//! Each remote service is consumed through a backend trait. The `aws-sdk`
//! feature provides backends over the official SDK; [`mocks`] provides
//! in-memory ones.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use aws_bulk::{BulkClient, BulkConfig};
//!
//! # #[cfg(feature = "aws-sdk")]
//! #[tokio::main]
//! async fn main() -> Result<(), aws_bulk::BulkError> {
//!     let client = BulkClient::from_aws(BulkConfig::from_env()?).await?;
//!
//!     let report = client.eraser().delete_container("scratch-bucket").await?;
//!     println!("Deleted {} versions", report.versions_deleted);
//!
//!     let failures = client
//!         .dispatcher()
//!         .send_bulk("https://sqs.us-east-1.amazonaws.com/123456789012/jobs", &["a", "b"])
//!         .await?;
//!     assert!(failures.is_empty());
//!     Ok(())
//! }
//! # #[cfg(not(feature = "aws-sdk"))]
//! # fn main() {}
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod backend;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod mocks;
pub mod pagination;
pub mod services;
pub mod transfer;
pub mod types;

// Re-export main types at crate root
pub use backend::{IdentityBackend, ObjectStoreBackend, QueueBackend};
pub use client::{BulkClient, BulkClientBuilder};
pub use config::BulkConfig;
pub use credentials::AwsCredentials;
pub use error::{
    BulkError, ConfigurationError, NetworkError, ResponseError, ServiceError, ServiceKind,
    TransferError,
};
pub use pagination::paginate;
pub use services::{BatchDispatcher, BulkEraser, IdentityLookup, PollingReceiver, StorageService};
pub use transfer::{
    TransferConfig, TransferCoordinator, TransferHandle, TransferReceipt, TransferSource,
    TransferState,
};
pub use types::{
    BatchFailureRecord, Cursor, EraseReport, Message, ObjectSummary, Page, ReceiptHandle,
    VersionRecord,
};

/// Result type for bulk operations.
pub type Result<T> = std::result::Result<T, BulkError>;
