//! Common API utilities and shared types
//!
//! Pagination follows the `{count, next, previous, results}` envelope the
//! back-office clients already speak.

use serde::{Deserialize, Serialize};

/// Default page number (1-indexed)
pub fn default_page() -> i64 {
    1
}

/// Default page size
pub fn default_page_size() -> i64 {
    20
}

/// Largest accepted page size
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination query parameters
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PageQuery {
    /// Clamp to sane bounds: page >= 1, 1 <= page_size <= MAX_PAGE_SIZE
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

/// Paginated response envelope: `{count, next, previous, results}`
#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// Total number of rows matching the query
    pub count: i64,
    /// URL of the next page, if any
    pub next: Option<String>,
    /// URL of the previous page, if any
    pub previous: Option<String>,
    /// The rows of this page
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    /// Build the envelope for one page of `results` out of `count` total.
    ///
    /// `path` is the request path the next/previous URLs are built on.
    pub fn new(path: &str, query: PageQuery, count: i64, results: Vec<T>) -> Self {
        let query = query.clamped();
        let last_page = if count == 0 {
            1
        } else {
            (count + query.page_size - 1) / query.page_size
        };

        let page_url =
            |page: i64| format!("{}?page={}&page_size={}", path, page, query.page_size);
        let next = (query.page < last_page).then(|| page_url(query.page + 1));
        let previous = (query.page > 1).then(|| page_url(query.page - 1));

        Self {
            count,
            next,
            previous,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: i64, page_size: i64) -> PageQuery {
        PageQuery { page, page_size }
    }

    #[test]
    fn test_clamped_bounds() {
        let q = query(0, 0).clamped();
        assert_eq!(q.page, 1);
        assert_eq!(q.page_size, 1);

        let q = query(3, 10_000).clamped();
        assert_eq!(q.page, 3);
        assert_eq!(q.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_offset() {
        assert_eq!(query(1, 20).offset(), 0);
        assert_eq!(query(3, 20).offset(), 40);
    }

    #[test]
    fn test_envelope_first_page() {
        let page = Paginated::new("/api/v1/till/sessions", query(1, 2), 5, vec![1, 2]);
        assert_eq!(page.count, 5);
        assert_eq!(
            page.next.as_deref(),
            Some("/api/v1/till/sessions?page=2&page_size=2")
        );
        assert!(page.previous.is_none());
    }

    #[test]
    fn test_envelope_middle_page() {
        let page = Paginated::new("/api/v1/orders", query(2, 2), 5, vec![3, 4]);
        assert_eq!(
            page.next.as_deref(),
            Some("/api/v1/orders?page=3&page_size=2")
        );
        assert_eq!(
            page.previous.as_deref(),
            Some("/api/v1/orders?page=1&page_size=2")
        );
    }

    #[test]
    fn test_envelope_last_page() {
        let page = Paginated::new("/api/v1/orders", query(3, 2), 5, vec![5]);
        assert!(page.next.is_none());
        assert_eq!(
            page.previous.as_deref(),
            Some("/api/v1/orders?page=2&page_size=2")
        );
    }

    #[test]
    fn test_envelope_empty() {
        let page: Paginated<i32> = Paginated::new("/api/v1/orders", query(1, 20), 0, vec![]);
        assert_eq!(page.count, 0);
        assert!(page.next.is_none());
        assert!(page.previous.is_none());
        assert!(page.results.is_empty());
    }
}
