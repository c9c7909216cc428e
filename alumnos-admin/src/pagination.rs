//! Pagination utilities
//!
//! Lists are paged with a caller-chosen page size (default 20, max 100).
//! Out-of-range pages clamp to `[1, total_pages]`.

use serde::{Deserialize, Serialize};

/// Page size used when the request does not ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page size a request may ask for
pub const MAX_PAGE_SIZE: i64 = 100;

/// Page selection from query parameters
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Rows per page after clamping
    pub page_size: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination metadata from total results and requested page
///
/// # Examples
/// ```
/// use alumnos_admin::pagination::calculate_pagination;
///
/// // 45 total results at 20 per page = 3 pages (20 + 20 + 5)
/// let p = calculate_pagination(45, 2, 20);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 20);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(45, 99, 20);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 40);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64, page_size: i64) -> Pagination {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let total_pages = (total_results + page_size - 1) / page_size;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        page_size,
        total_pages,
        offset,
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
            total_pages: pagination.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normal() {
        let p = calculate_pagination(250, 2, 100);
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_out_of_bounds_low() {
        let p = calculate_pagination(150, 0, 20);
        assert_eq!(p.page, 1);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, 1, 20);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_exact_page_boundary() {
        let p = calculate_pagination(40, 2, 20);
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.offset, 20);
    }

    #[test]
    fn test_page_size_clamped() {
        assert_eq!(calculate_pagination(500, 1, 1000).page_size, MAX_PAGE_SIZE);
        assert_eq!(calculate_pagination(500, 1, 0).page_size, 1);
    }
}
