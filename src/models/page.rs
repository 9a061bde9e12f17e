//! Pagination envelope shared by user-facing and admin listings.

use serde::{Deserialize, Serialize};

/// Exact pagination metadata computed from a true total count.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    /// Build metadata from a 1-based page number, a page size and the total
    /// item count of the identical filter.
    pub fn new(page: i64, limit: i64, total_items: i64) -> Self {
        let limit = limit.max(1);
        let total_pages = (total_items + limit - 1) / limit;
        Self {
            current_page: page,
            total_pages,
            total_items,
            has_next_page: page < total_pages,
            has_prev_page: page > 1 && total_items > 0,
        }
    }
}

/// One page of results plus its pagination metadata.
///
/// The shape is identical across file and folder listings, user and admin
/// alike, so clients can share their paging code.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}
