//! Paged results and their metadata.
//!
//! A [`PageResult`] carries one page of instances plus two blocks of metadata:
//! [`PageItems`] (which slice of the full result this page covers) and [`PageNav`]
//! (where the neighbouring pages are). Metadata is derived from `page`, `limit` and the
//! total match count by [`PageResultBuilder::build`]:
//!
//! - `pages.total = ceil(total / limit)`
//! - `pages.next = page + 1`, `pages.has_next = next <= pages.total`
//! - `pages.prev = page - 1`, `pages.has_prev = prev != 0`
//! - `items.begin = (page * limit - limit) + 1` and `items.end = page * limit`, both
//!   clamped to `total`
//!
//! Pages are 1-indexed.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::page::PageResult;
//!
//! let page = PageResult::builder(vec!["a", "b"])
//!     .with_page(1)
//!     .with_limit(2)
//!     .with_total(3)
//!     .build();
//!
//! assert_eq!(page.pages.total, 2);
//! assert!(page.pages.has_next);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::min;

use crate::error::{ModelError, ModelResult};

/// A single page of results with item and page metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub data: Vec<T>,
    pub items: PageItems,
    pub pages: PageNav,
}

/// Position of the page within the full result set.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageItems {
    /// Maximum number of items per page.
    pub limit: u64,
    /// 1-based position of the first item on the page.
    pub begin: u64,
    /// 1-based position of the last item on the page.
    pub end: u64,
    /// Number of items matching the query across all pages.
    pub total: u64,
}

/// Navigation metadata.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageNav {
    /// The current page number (1-indexed).
    pub current: u64,
    /// The previous page number; `0` on the first page.
    pub prev: u64,
    /// Whether a previous page exists.
    pub has_prev: bool,
    /// The next page number, even past the last page.
    pub next: u64,
    /// Whether the next page holds any items.
    pub has_next: bool,
    /// Total number of pages.
    pub total: u64,
}

impl<T> PageResult<T> {
    /// Creates a new builder for the given page data.
    pub fn builder(data: Vec<T>) -> PageResultBuilder<T> {
        PageResultBuilder::new(data)
    }

    /// Maps the page data, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            data: self.data.into_iter().map(f).collect(),
            items: self.items,
            pages: self.pages,
        }
    }
}

/// Checks that `page` and `limit` are both at least 1.
///
/// # Errors
///
/// Returns [`ModelError::InvalidPaging`] otherwise.
pub fn check_paging(page: u64, limit: u64) -> ModelResult<()> {
    if page == 0 {
        return Err(ModelError::InvalidPaging("page must be at least 1".to_string()));
    }
    if limit == 0 {
        return Err(ModelError::InvalidPaging("limit must be at least 1".to_string()));
    }

    Ok(())
}

/// Number of items to skip to reach `page`.
pub fn skip_for(page: u64, limit: u64) -> u64 {
    page.saturating_sub(1).saturating_mul(limit)
}

/// Builder for [`PageResult`] that derives the metadata on [`build`](Self::build).
pub struct PageResultBuilder<T> {
    data: Vec<T>,
    page: u64,
    limit: u64,
    total: u64,
}

impl<T> PageResultBuilder<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            page: 1,
            limit: 10,
            total: 0,
        }
    }

    /// Sets the current page (1-indexed).
    pub fn with_page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    /// Sets the number of items per page.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the number of items matching the query across all pages.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = total;
        self
    }

    /// Builds the page. Callers are expected to have run [`check_paging`].
    pub fn build(self) -> PageResult<T> {
        let Self { data, page, limit, total } = self;

        let pages_total = if limit == 0 { 0 } else { total.div_ceil(limit) };
        let next = page.saturating_add(1);
        let prev = page.saturating_sub(1);
        let last_slot = page.saturating_mul(limit);

        PageResult {
            data,
            items: PageItems {
                limit,
                begin: min(last_slot.saturating_sub(limit).saturating_add(1), total),
                end: min(last_slot, total),
                total,
            },
            pages: PageNav {
                current: page,
                prev,
                has_prev: prev != 0,
                next,
                has_next: next <= pages_total,
                total: pages_total,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(page: u64, limit: u64, total: u64) -> PageResult<()> {
        PageResult::builder(Vec::new())
            .with_page(page)
            .with_limit(limit)
            .with_total(total)
            .build()
    }

    #[test]
    fn test_single_page_fits_everything() {
        let page = meta(1, 10, 3);

        assert_eq!(page.items, PageItems { limit: 10, begin: 1, end: 3, total: 3 });
        assert_eq!(page.pages.total, 1);
        assert!(!page.pages.has_next);
        assert!(!page.pages.has_prev);
    }

    #[test]
    fn test_end_not_clamped_when_below_total() {
        let page = meta(1, 2, 3);

        assert_eq!(page.items.begin, 1);
        assert_eq!(page.items.end, 2);
        assert_eq!(page.pages.total, 2);
        assert!(page.pages.has_next);
        assert_eq!(page.pages.next, 2);
    }

    #[test]
    fn test_last_partial_page() {
        let page = meta(2, 2, 3);

        assert_eq!(page.items.begin, 3);
        assert_eq!(page.items.end, 3);
        assert!(page.pages.has_prev);
        assert_eq!(page.pages.prev, 1);
        assert!(!page.pages.has_next);
    }

    #[test]
    fn test_empty_result_clamps_to_zero() {
        let page = meta(1, 2, 0);

        assert_eq!(page.items.begin, 0);
        assert_eq!(page.items.end, 0);
        assert_eq!(page.pages.total, 0);
        assert!(!page.pages.has_next);
    }

    #[test]
    fn test_page_past_the_end() {
        let page = meta(5, 10, 12);

        assert_eq!(page.items.begin, 12);
        assert_eq!(page.items.end, 12);
        assert_eq!(page.pages.total, 2);
        assert!(page.pages.has_prev);
        assert!(!page.pages.has_next);
    }

    #[test]
    fn test_paging_preconditions() {
        assert!(check_paging(1, 1).is_ok());
        assert!(matches!(check_paging(0, 10), Err(ModelError::InvalidPaging(_))));
        assert!(matches!(check_paging(1, 0), Err(ModelError::InvalidPaging(_))));
    }

    #[test]
    fn test_skip_for() {
        assert_eq!(skip_for(1, 10), 0);
        assert_eq!(skip_for(3, 20), 40);
    }

    #[test]
    fn test_nav_serializes_camel_case() {
        let value = serde_json::to_value(meta(1, 10, 3)).unwrap();

        assert_eq!(value["pages"]["hasNext"], serde_json::json!(false));
        assert_eq!(value["pages"]["hasPrev"], serde_json::json!(false));
        assert_eq!(value["items"]["end"], serde_json::json!(3));
    }
}
