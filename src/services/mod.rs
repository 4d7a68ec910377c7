//! Bulk operation services.
//!
//! - Storage: listing and existence checks
//! - Eraser: emptying and deleting containers
//! - Dispatcher: chunked batch sends
//! - Receiver: per-queue polling and message lifecycle
//! - Identity: name-to-ARN lookups

mod dispatcher;
mod eraser;
mod identity;
mod receiver;
mod storage;

pub use dispatcher::BatchDispatcher;
pub use eraser::BulkEraser;
pub use identity::IdentityLookup;
pub use receiver::PollingReceiver;
pub use storage::StorageService;
