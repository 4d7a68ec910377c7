//! Request, response and record types shared by the services and backends.

mod identity;
mod queue;
mod storage;

pub use identity::*;
pub use queue::*;
pub use storage::*;

use serde::{Deserialize, Serialize};

/// Continuation state returned by a truncated list page.
///
/// Most catalogs need a single marker. Version listings resume from a
/// (key, version-id) pair, which is what `version_marker` carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Primary marker (continuation token, key marker or IAM marker).
    pub marker: String,
    /// Secondary marker for version listings.
    pub version_marker: Option<String>,
}

impl Cursor {
    /// Create a single-marker cursor.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            version_marker: None,
        }
    }

    /// Create a (key, version-id) cursor.
    pub fn with_version(marker: impl Into<String>, version_marker: Option<String>) -> Self {
        Self {
            marker: marker.into(),
            version_marker,
        }
    }
}

/// One page of a paginated catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page, in catalog order.
    pub items: Vec<T>,
    /// Cursor for the next page.
    pub next_cursor: Option<Cursor>,
    /// Whether more pages remain.
    pub truncated: bool,
}

impl<T> Page<T> {
    /// A final page.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            truncated: false,
        }
    }

    /// A page followed by more pages.
    pub fn more(items: Vec<T>, next_cursor: Cursor) -> Self {
        Self {
            items,
            next_cursor: Some(next_cursor),
            truncated: true,
        }
    }
}
