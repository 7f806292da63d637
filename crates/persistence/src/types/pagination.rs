//! Page-based pagination for listing operations.

use serde::{Deserialize, Serialize};

/// Maximum page size accepted by listing operations.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Default page size when none is requested.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// A request for one page of results (1-based page numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// The 1-based page number.
    pub page: u32,
    /// Number of items per page.
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Creates a page request, clamping values into the accepted range.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Returns the number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.page_size)
    }

    /// Returns the row limit.
    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

/// Pagination metadata returned alongside a page of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// The 1-based page number.
    pub page: u32,
    /// Number of items per page.
    pub page_size: u32,
    /// Total number of matching items.
    pub total: u64,
    /// Total number of pages.
    pub total_pages: u64,
}

impl Pagination {
    /// Builds pagination metadata for a request and a total count.
    pub fn new(request: PageRequest, total: u64) -> Self {
        let size = u64::from(request.page_size.max(1));
        Self {
            page: request.page,
            page_size: request.page_size,
            total,
            total_pages: total.div_ceil(size),
        }
    }

    /// Returns `true` if there is a page after this one.
    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages
    }
}

/// One page of items plus its pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Pagination metadata.
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps() {
        let req = PageRequest::new(0, 0);
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, 1);

        let req = PageRequest::new(3, 10_000);
        assert_eq!(req.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_offset() {
        assert_eq!(PageRequest::new(1, 20).offset(), 0);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }

    #[test]
    fn test_pagination_totals() {
        let p = Pagination::new(PageRequest::new(1, 20), 41);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next());

        let p = Pagination::new(PageRequest::new(3, 20), 41);
        assert!(!p.has_next());

        let p = Pagination::new(PageRequest::new(1, 20), 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next());
    }
}
