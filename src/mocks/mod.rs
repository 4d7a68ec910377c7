//! Mock implementations for testing.
//!
//! In-memory backends that behave like the remote services closely enough
//! to exercise pagination, batching, visibility and failure paths without
//! a network.

mod identity;
mod queue;
mod storage;

pub use identity::{IdentityOp, InMemoryIdentity};
pub use queue::{InMemoryQueue, QueueOp, DEFAULT_VISIBILITY_TIMEOUT};
pub use storage::{InMemoryObjectStore, StoreOp};

use crate::types::{Cursor, Page};

/// Quoted MD5 entity tag, as the storage service reports for simple puts.
pub(crate) fn md5_etag(data: &[u8]) -> String {
    format!("\"{}\"", crate::transfer::md5_hex(data))
}

/// Slice `items` into an index-cursor page.
pub(crate) fn page_of<T: Clone>(items: &[T], cursor: Option<Cursor>, page_size: usize) -> Page<T> {
    let start = cursor
        .and_then(|c| c.marker.parse::<usize>().ok())
        .unwrap_or(0)
        .min(items.len());
    let end = (start + page_size).min(items.len());
    let page = items[start..end].to_vec();
    if end < items.len() {
        Page::more(page, Cursor::new(end.to_string()))
    } else {
        Page::last(page)
    }
}
