//! Pagination Utilities
//!
//! Provides helpers for consistent pagination across all list endpoints.
//! Page-style endpoints take `page`/`pageSize`, event listings take
//! `limit`/`offset`; both are validated rather than clamped, so out-of-range
//! values surface as 400s.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Default page size
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Maximum page size / listing limit
pub const MAX_PAGE_SIZE: usize = 1000;

/// Pagination query parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationQuery {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: usize,
    /// Items per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PaginationQuery {
    /// Validate the raw values and derive the offset.
    pub fn normalize(&self) -> AppResult<NormalizedPagination> {
        if self.page < 1 {
            return Err(AppError::validation("page must be at least 1"));
        }
        if self.page_size < 1 || self.page_size > MAX_PAGE_SIZE {
            return Err(AppError::validation(format!(
                "pageSize must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(NormalizedPagination {
            page: self.page,
            page_size: self.page_size,
            offset: (self.page - 1) * self.page_size,
        })
    }
}

/// Validated pagination values ready for repository queries
#[derive(Debug, Clone, Copy)]
pub struct NormalizedPagination {
    /// Page number (1-indexed, always >= 1)
    pub page: usize,
    /// Items per page (always within bounds)
    pub page_size: usize,
    /// Offset for skip/take queries
    pub offset: usize,
}

/// Limit/offset query parameters for the event listings
#[derive(Debug, Clone, Deserialize)]
pub struct LimitOffsetQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

impl LimitOffsetQuery {
    pub fn validate(&self) -> AppResult<()> {
        if self.limit < 1 || self.limit > MAX_PAGE_SIZE {
            return Err(AppError::validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }
}

/// Paginated result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    /// Items in this page
    pub items: Vec<T>,
    /// Total count across all pages
    pub total: usize,
    /// Current page (1-indexed)
    pub page: usize,
    /// Items per page
    pub page_size: usize,
    /// Total number of pages
    pub total_pages: usize,
    /// Has next page
    pub has_next: bool,
    /// Has previous page
    pub has_previous: bool,
}

impl<T> Paginated<T> {
    /// Create a new paginated result
    pub fn new(items: Vec<T>, total: usize, pagination: &NormalizedPagination) -> Self {
        let total_pages = total.div_ceil(pagination.page_size);
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
            total_pages,
            has_next: pagination.page < total_pages,
            has_previous: pagination.page > 1,
        }
    }
}
