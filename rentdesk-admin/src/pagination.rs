//! Pagination utilities for list endpoints (100 rows/page)

use serde::Serialize;

/// Page size constant for all pagination
pub const PAGE_SIZE: i64 = 100;

/// Serde default for `?page=` (1-indexed)
pub fn default_page() -> i64 {
    1
}

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination metadata from total results and requested page
///
/// Ensures page is within valid bounds [1, total_pages]
///
/// # Examples
/// ```
/// use rentdesk_admin::pagination::calculate_pagination;
///
/// // 250 total results = 3 pages (100 + 100 + 50)
/// let p = calculate_pagination(250, 2);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 100);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(250, 99);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 200);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64) -> Pagination {
    let total_pages = (total_results + PAGE_SIZE - 1) / PAGE_SIZE;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * PAGE_SIZE;

    Pagination {
        page,
        total_pages,
        offset,
    }
}

/// One page of typed results
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub total_results: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(total_results: i64, pagination: Pagination, results: Vec<T>) -> Self {
        Self {
            total_results,
            page: pagination.page,
            page_size: PAGE_SIZE,
            total_pages: pagination.total_pages,
            results,
        }
    }
}
