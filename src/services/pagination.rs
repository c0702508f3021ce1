use serde::Serialize;

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;
/// Largest offset the database accepts.
pub const MAX_SKIP: u64 = i64::MAX as u64;

/// The window of a list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub skip: u64,
    pub limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    /// Read a window from raw query values.
    ///
    /// The limit falls back to the default and is clamped to `1..=MAX_LIMIT`.
    /// An explicit `skip` wins over `page`; either is capped at `MAX_SKIP`.
    pub fn from_params(page: Option<&str>, limit: Option<&str>, skip: Option<&str>) -> Self {
        let limit = parse_number(limit)
            .map(|l| l.clamp(1, MAX_LIMIT))
            .unwrap_or(DEFAULT_LIMIT);

        let skip = match parse_number(skip) {
            Some(skip) => skip,
            None => parse_number(page)
                .filter(|p| *p >= 1)
                .map(|p| (p - 1).saturating_mul(limit))
                .unwrap_or(0),
        }
        .min(MAX_SKIP);

        Self { skip, limit }
    }
}

fn parse_number(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
}

/// Page metadata returned next to list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub limit: u64,
    pub skip: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn new(total: u64, limit: u64, skip: u64) -> Self {
        let limit = limit.max(1);
        Self {
            total,
            limit,
            skip,
            total_pages: total.div_ceil(limit),
            current_page: skip / limit + 1,
            has_next_page: skip.saturating_add(limit) < total,
            has_prev_page: skip > 0,
        }
    }

    pub fn for_request(total: u64, request: PageRequest) -> Self {
        Self::new(total, request.limit, request.skip)
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page() {
        let p = Pagination::new(25, 10, 0);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.current_page, 1);
        assert!(p.has_next_page);
        assert!(!p.has_prev_page);
    }

    #[test]
    fn test_second_page() {
        let p = Pagination::new(25, 10, 10);
        assert_eq!(p.current_page, 2);
        assert!(p.has_prev_page);
        assert!(p.has_next_page);
    }

    #[test]
    fn test_last_page() {
        let p = Pagination::new(25, 10, 20);
        assert_eq!(p.current_page, 3);
        assert!(!p.has_next_page);
    }

    #[test]
    fn test_empty_result() {
        let p = Pagination::new(0, 10, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next_page);
        assert!(!p.has_prev_page);
    }

    #[test]
    fn test_request_defaults_and_clamping() {
        assert_eq!(PageRequest::from_params(None, None, None), PageRequest::default());
        assert_eq!(PageRequest::from_params(None, Some("500"), None).limit, MAX_LIMIT);
        assert_eq!(PageRequest::from_params(None, Some("0"), None).limit, 1);
        assert_eq!(PageRequest::from_params(None, Some("ten"), None).limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_skip_wins_over_page() {
        let req = PageRequest::from_params(Some("4"), Some("10"), Some("5"));
        assert_eq!(req.skip, 5);

        let req = PageRequest::from_params(Some("4"), Some("10"), None);
        assert_eq!(req.skip, 30);

        let req = PageRequest::from_params(Some("0"), None, None);
        assert_eq!(req.skip, 0);
    }

    #[test]
    fn test_huge_offsets_are_capped() {
        let req = PageRequest::from_params(None, Some("10"), Some("18446744073709551615"));
        assert_eq!(req.skip, MAX_SKIP);
        let p = Pagination::for_request(25, req);
        assert!(!p.has_next_page);
        assert!(p.has_prev_page);

        let req = PageRequest::from_params(Some("18446744073709551615"), Some("100"), None);
        assert_eq!(req.skip, MAX_SKIP);

        let p = Pagination::new(u64::MAX, 10, u64::MAX - 5);
        assert!(!p.has_next_page);
    }

    #[test]
    fn test_serialized_names() {
        let json = serde_json::to_value(Pagination::new(25, 10, 0)).unwrap();
        assert_eq!(json["totalPages"], 3);
        assert_eq!(json["hasNextPage"], true);
        assert_eq!(json["hasPrevPage"], false);
    }
}
