//! List, pagination and sort types shared by every tenant-scoped listing,
//! plus timestamp helpers.

use crate::error::{DevRelError, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Validated `page`/`limit` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Build from raw query values. `page` must be ≥ 1 and `limit` within
    /// `1..=max_limit`; absent values take the defaults.
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32, max_limit: u32) -> Result<Self> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(DevRelError::validation("page must be at least 1"));
        }
        let limit = limit.unwrap_or(default_limit);
        if limit == 0 || limit > max_limit {
            return Err(DevRelError::validation(format!(
                "limit must be between 1 and {max_limit}"
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

/// Pagination metadata returned with every list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

/// One slot in a rendered pagination bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "page", rename_all = "lowercase")]
pub enum PageLink {
    Page(u32),
    Ellipsis,
}

impl PageInfo {
    pub fn new(request: PageRequest, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            total.div_ceil(request.limit as u64) as u32
        };
        Self {
            page: request.page,
            limit: request.limit,
            total,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    /// Page links to render: first, last, and `siblings` pages on each side
    /// of the current one, with ellipses for gaps. `None` when there is at
    /// most one page, in which case no pagination is shown.
    pub fn window(&self, siblings: u32) -> Option<Vec<PageLink>> {
        if self.total_pages <= 1 {
            return None;
        }
        let last = self.total_pages;
        let current = self.page.clamp(1, last);
        let start = current.saturating_sub(siblings).max(1);
        let end = (current + siblings).min(last);

        let mut links = Vec::new();
        if start > 1 {
            links.push(PageLink::Page(1));
            if start > 2 {
                links.push(PageLink::Ellipsis);
            }
        }
        links.extend((start..=end).map(PageLink::Page));
        if end < last {
            if end < last - 1 {
                links.push(PageLink::Ellipsis);
            }
            links.push(PageLink::Page(last));
        }
        Some(links)
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        Self {
            items,
            pagination: PageInfo::new(request, total),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// A resolved `orderBy`: the SQL expression to sort on and the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub column: &'static str,
    pub descending: bool,
}

impl Sort {
    /// Parse `field` (ascending) or `-field` (descending). `allowed` maps
    /// API field names to SQL expressions; unknown fields are rejected.
    pub fn parse(raw: Option<&str>, allowed: &[(&str, &'static str)], default: Sort) -> Result<Self> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(default);
        };
        let (field, descending) = match raw.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (raw, false),
        };
        allowed
            .iter()
            .find(|(name, _)| *name == field)
            .map(|&(_, column)| Sort { column, descending })
            .ok_or_else(|| {
                let names: Vec<&str> = allowed.iter().map(|(n, _)| *n).collect();
                DevRelError::validation(format!(
                    "orderBy '{field}' is not one of: {}",
                    names.join(", ")
                ))
            })
    }

    pub const fn desc(column: &'static str) -> Self {
        Self { column, descending: true }
    }

    pub const fn asc(column: &'static str) -> Self {
        Self { column, descending: false }
    }

    /// `ORDER BY` body. Ties are broken on `tiebreak` (normally an
    /// insertion-order column) in the same direction.
    pub fn to_sql(&self, tiebreak: &str) -> String {
        let dir = if self.descending { "DESC" } else { "ASC" };
        format!("{} {dir}, {tiebreak} {dir}", self.column)
    }
}

/// Canonical stored timestamp: UTC, millisecond precision, `Z` suffix.
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now() -> String {
    timestamp(Utc::now())
}

/// Parse an RFC 3339 timestamp into canonical form.
pub fn parse_timestamp(raw: &str) -> Result<String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| timestamp(dt.with_timezone(&Utc)))
        .map_err(|_| DevRelError::validation(format!("'{raw}' is not an RFC 3339 timestamp")))
}

/// Parse a range bound given either as RFC 3339 or as a plain date. A plain
/// date expands to the start of the day, or to its last millisecond when
/// `end_of_day` is set.
pub fn parse_range_bound(raw: &str, end_of_day: bool) -> Result<String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        let time = if end_of_day {
            date.and_hms_milli_opt(23, 59, 59, 999)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        return time
            .map(|t| timestamp(t.and_utc()))
            .ok_or_else(|| DevRelError::validation(format!("invalid date '{raw}'")));
    }
    parse_timestamp(raw)
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| DevRelError::validation(format!("'{raw}' is not a YYYY-MM-DD date")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults_and_bounds() {
        let req = PageRequest::new(None, None, 20, 100).unwrap();
        assert_eq!(req, PageRequest { page: 1, limit: 20 });
        assert_eq!(PageRequest::new(Some(3), Some(10), 20, 100).unwrap().offset(), 20);
        assert!(PageRequest::new(Some(0), None, 20, 100).is_err());
        assert!(PageRequest::new(None, Some(0), 20, 100).is_err());
        assert!(PageRequest::new(None, Some(101), 20, 100).is_err());
    }

    #[test]
    fn test_total_pages() {
        let req = PageRequest { page: 1, limit: 20 };
        assert_eq!(PageInfo::new(req, 0).total_pages, 0);
        assert_eq!(PageInfo::new(req, 20).total_pages, 1);
        assert_eq!(PageInfo::new(req, 21).total_pages, 2);
        assert!(PageInfo::new(req, 21).has_next());
        assert!(!PageInfo::new(req, 21).has_previous());
    }

    #[test]
    fn test_window_hidden_for_single_page() {
        let req = PageRequest { page: 1, limit: 20 };
        assert!(PageInfo::new(req, 0).window(1).is_none());
        assert!(PageInfo::new(req, 15).window(1).is_none());
    }

    #[test]
    fn test_window_with_ellipses() {
        let info = PageInfo::new(PageRequest { page: 5, limit: 10 }, 100);
        let links = info.window(1).unwrap();
        assert_eq!(
            links,
            vec![
                PageLink::Page(1),
                PageLink::Ellipsis,
                PageLink::Page(4),
                PageLink::Page(5),
                PageLink::Page(6),
                PageLink::Ellipsis,
                PageLink::Page(10),
            ]
        );

        let first = PageInfo::new(PageRequest { page: 1, limit: 10 }, 30).window(1).unwrap();
        assert_eq!(first, vec![PageLink::Page(1), PageLink::Page(2), PageLink::Page(3)]);
    }

    #[test]
    fn test_sort_parse() {
        let allowed = [("name", "name"), ("createdAt", "created_at")];
        let default = Sort::desc("created_at");
        assert_eq!(Sort::parse(None, &allowed, default).unwrap(), default);
        assert_eq!(Sort::parse(Some("name"), &allowed, default).unwrap(), Sort::asc("name"));
        assert_eq!(
            Sort::parse(Some("-createdAt"), &allowed, default).unwrap(),
            Sort::desc("created_at")
        );
        assert!(Sort::parse(Some("password_hash"), &allowed, default).is_err());
        assert_eq!(Sort::desc("name").to_sql("rowid"), "name DESC, rowid DESC");
    }

    #[test]
    fn test_range_bounds() {
        assert_eq!(parse_range_bound("2024-03-01", false).unwrap(), "2024-03-01T00:00:00.000Z");
        assert_eq!(parse_range_bound("2024-03-01", true).unwrap(), "2024-03-01T23:59:59.999Z");
        assert_eq!(
            parse_range_bound("2024-03-01T10:00:00+02:00", false).unwrap(),
            "2024-03-01T08:00:00.000Z"
        );
        assert!(parse_range_bound("yesterday", false).is_err());
    }
}
