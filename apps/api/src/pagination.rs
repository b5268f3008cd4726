use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageParams {
    /// Page number, at least 1.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size clamped to `1..=MAX_PER_PAGE`.
    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page())
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * self.limit()
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, params: &PageParams, total: i64) -> Self {
        Self {
            items,
            page: params.page(),
            per_page: params.per_page(),
            total,
        }
    }
}

/// Wraps a free-text search term for `ILIKE`, escaping wildcard characters.
pub fn like_pattern(q: &str) -> String {
    let escaped = q
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = PageParams::default();
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), DEFAULT_PER_PAGE);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_zero_page_treated_as_first() {
        let p = PageParams {
            page: Some(0),
            per_page: Some(10),
        };
        assert_eq!(p.page(), 1);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_per_page_clamped() {
        let p = PageParams {
            page: Some(3),
            per_page: Some(1000),
        };
        assert_eq!(p.per_page(), MAX_PER_PAGE);
        assert_eq!(p.offset(), 200);
        let p = PageParams {
            page: Some(1),
            per_page: Some(0),
        };
        assert_eq!(p.per_page(), 1);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" 100%_steel "), "%100\\%\\_steel%");
    }
}
