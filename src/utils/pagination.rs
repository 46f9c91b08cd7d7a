// src/utils/pagination.rs

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw `page` / `limit` query values.
///
/// Kept as strings so that a malformed number yields the same
/// "Invalid pagination parameters" error as an out-of-range one.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Validated page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn has_next(&self, total: i64) -> bool {
        self.offset() + self.limit < total
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    /// Relative link to the following page, if any.
    pub fn next_link(&self, total: i64) -> Option<String> {
        self.has_next(total)
            .then(|| format!("?page={}&limit={}", self.page + 1, self.limit))
    }

    pub fn previous_link(&self) -> Option<String> {
        self.has_previous()
            .then(|| format!("?page={}&limit={}", self.page - 1, self.limit))
    }
}

/// Envelope for paginated listings.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl Page {
    pub fn wrap<T>(&self, count: i64, results: Vec<T>) -> Paginated<T> {
        Paginated {
            count,
            next: self.next_link(count),
            previous: self.previous_link(),
            results,
        }
    }
}

impl PageParams {
    /// `page` must be >= 1; `limit` must be >= 1 and is capped at [`MAX_PAGE_SIZE`].
    /// A page whose window lies beyond `i64::MAX` is rejected.
    pub fn resolve(&self) -> Result<Page, AppError> {
        let invalid = || AppError::BadRequest("Invalid pagination parameters".to_string());

        let page = match self.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => raw.parse::<i64>().map_err(|_| invalid())?,
        };
        let limit = match self.limit.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_PAGE_SIZE,
            Some(raw) => raw.parse::<i64>().map_err(|_| invalid())?,
        };

        if page < 1 || limit < 1 {
            return Err(invalid());
        }
        let limit = limit.min(MAX_PAGE_SIZE);

        // The end of the window must fit in an i64 for `offset` and `has_next`.
        (page - 1)
            .checked_mul(limit)
            .and_then(|offset| offset.checked_add(limit))
            .ok_or_else(invalid)?;

        Ok(Page { page, limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: Option<&str>, limit: Option<&str>) -> PageParams {
        PageParams {
            page: page.map(String::from),
            limit: limit.map(String::from),
        }
    }

    #[test]
    fn defaults_to_first_page_of_twenty() {
        let page = params(None, None).resolve().unwrap();
        assert_eq!(page, Page { page: 1, limit: 20 });
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn limit_is_capped() {
        let page = params(Some("3"), Some("500")).resolve().unwrap();
        assert_eq!(page.limit, 100);
        assert_eq!(page.offset(), 200);
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        assert!(params(Some("0"), None).resolve().is_err());
        assert!(params(None, Some("0")).resolve().is_err());
        assert!(params(Some("abc"), None).resolve().is_err());
        assert!(params(None, Some("-5")).resolve().is_err());
    }

    #[test]
    fn rejects_pages_past_the_addressable_range() {
        assert!(params(Some("9223372036854775807"), Some("100")).resolve().is_err());
        assert!(params(Some("9223372036854775807"), Some("1")).resolve().is_err());
        assert!(params(Some("92233720368547759"), Some("100")).resolve().is_err());

        let last = params(Some("92233720368547757"), Some("100")).resolve().unwrap();
        assert_eq!(last.offset(), 9_223_372_036_854_775_600);
        assert!(!last.has_next(10));
    }

    #[test]
    fn links_follow_the_window() {
        let page = params(Some("2"), Some("10")).resolve().unwrap();
        assert_eq!(page.next_link(25).as_deref(), Some("?page=3&limit=10"));
        assert_eq!(page.previous_link().as_deref(), Some("?page=1&limit=10"));
        assert_eq!(page.next_link(20), None);

        let first = params(None, Some("10")).resolve().unwrap();
        assert_eq!(first.previous_link(), None);
    }

    #[test]
    fn wrap_fills_the_envelope() {
        let page = params(Some("1"), Some("2")).resolve().unwrap();
        let wrapped = page.wrap(3, vec!["a", "b"]);
        assert_eq!(wrapped.count, 3);
        assert_eq!(wrapped.next.as_deref(), Some("?page=2&limit=2"));
        assert_eq!(wrapped.previous, None);
        assert_eq!(wrapped.results.len(), 2);
    }
}
