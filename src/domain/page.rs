//! Paged listing results.

use serde::{Deserialize, Serialize};

/// A slice of a larger result set, as returned by a repository
#[derive(Debug, Clone, PartialEq)]
pub struct PagedResult<T> {
    /// Items in the requested window
    pub items: Vec<T>,

    /// Size of the full result set
    pub total: usize,
}

impl<T> PagedResult<T> {
    /// Slice `items` down to the window `[start_index, start_index + page_size)`
    pub fn from_window(items: Vec<T>, start_index: usize, page_size: usize) -> Self {
        let total = items.len();
        let items = items.into_iter().skip(start_index).take(page_size).collect();
        Self { items, total }
    }
}

/// A page handed back to callers, with an opaque cursor for the next page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Absent when the result set is exhausted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}
