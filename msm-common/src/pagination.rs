//! Pagination utilities
//!
//! Index pages and the performance report are browsed a page at a time. Page
//! numbers are 1-indexed and out-of-range requests are clamped instead of
//! rejected.

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, SqlitePool};

use crate::Result;

/// Page sizes offered by the page-size selector
pub const PAGE_SIZE_OPTIONS: [i64; 9] = [3, 5, 10, 20, 30, 40, 50, 100, 500];

/// Page size used when nothing valid is requested or configured
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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
/// use msm_common::pagination::calculate_pagination;
///
/// // 25 total results at 10 per page = 3 pages (10 + 10 + 5)
/// let p = calculate_pagination(25, 2, 10);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 10);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(25, 99, 10);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 20);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64, page_size: i64) -> Pagination {
    let page_size = page_size.max(1);
    let total_pages = (total_results + page_size - 1) / page_size;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        total_pages,
        offset,
    }
}

/// Pick a page size from [`PAGE_SIZE_OPTIONS`], falling back to `default`
pub fn resolve_page_size(requested: Option<i64>, default: i64) -> i64 {
    match requested {
        Some(size) if PAGE_SIZE_OPTIONS.contains(&size) => size,
        _ if PAGE_SIZE_OPTIONS.contains(&default) => default,
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Page query parameters as submitted by the client
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// One page of an ordered result set
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedList<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl<T> PaginatedList<T> {
    pub fn has_previous_page(&self) -> bool {
        self.page > 1
    }

    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedList<U> {
        PaginatedList {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }

    /// Fetch one page of `select_sql`
    ///
    /// `select_sql` must be a complete, ordered SELECT without LIMIT/OFFSET.
    /// It is wrapped once to count rows and once to slice the requested page.
    pub async fn fetch(
        pool: &SqlitePool,
        select_sql: &str,
        requested_page: i64,
        page_size: i64,
    ) -> Result<Self>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let total_items: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM ({select_sql})"))
                .fetch_one(pool)
                .await?;

        let pagination = calculate_pagination(total_items, requested_page, page_size);

        let items = sqlx::query_as::<_, T>(&format!("{select_sql} LIMIT ? OFFSET ?"))
            .bind(page_size)
            .bind(pagination.offset)
            .fetch_all(pool)
            .await?;

        Ok(Self {
            items,
            page: pagination.page,
            page_size,
            total_items,
            total_pages: pagination.total_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[test]
    fn test_pagination_normal() {
        let p = calculate_pagination(25, 2, 10);
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 10);
    }

    #[test]
    fn test_pagination_out_of_bounds_high() {
        let p = calculate_pagination(15, 99, 10);
        assert_eq!(p.page, 2); // Clamped to last page
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.offset, 10);
    }

    #[test]
    fn test_pagination_out_of_bounds_low() {
        let p = calculate_pagination(15, -3, 10);
        assert_eq!(p.page, 1); // Clamped to first page
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, 4, 10);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_exact_page_boundary() {
        let p = calculate_pagination(20, 2, 10);
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.offset, 10);
    }

    #[test]
    fn test_resolve_page_size() {
        assert_eq!(resolve_page_size(Some(50), 10), 50);
        assert_eq!(resolve_page_size(Some(7), 10), 10);
        assert_eq!(resolve_page_size(None, 20), 20);
        assert_eq!(resolve_page_size(None, 12), DEFAULT_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_fetch_pages_ordered_query() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE numbers (n INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        for n in 1..=7i64 {
            sqlx::query("INSERT INTO numbers (n) VALUES (?)")
                .bind(n)
                .execute(&pool)
                .await
                .unwrap();
        }

        let page: PaginatedList<(i64,)> =
            PaginatedList::fetch(&pool, "SELECT n FROM numbers ORDER BY n DESC", 2, 3)
                .await
                .unwrap();

        assert_eq!(page.items, vec![(4,), (3,), (2,)]);
        assert_eq!(page.total_items, 7);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_previous_page());
        assert!(page.has_next_page());

        let clamped: PaginatedList<(i64,)> =
            PaginatedList::fetch(&pool, "SELECT n FROM numbers ORDER BY n DESC", 9, 3)
                .await
                .unwrap();
        assert_eq!(clamped.page, 3);
        assert_eq!(clamped.items, vec![(1,)]);
        assert!(!clamped.has_next_page());
    }
}
