//! List options for audit log queries: filters, sorting and pagination.
//!
//! Options usually come from HTTP query parameters:
//! `filter[application]=client,client.tunnel&sort=-timestamp&page[limit]=20`.

use crate::error_handling::types::ListOptionsError;
use chrono::{DateTime, NaiveDate, Utc};

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    TimestampGt,
    TimestampLt,
    TimestampSince,
    TimestampUntil,
    Username,
    RemoteIp,
    Application,
    Action,
    AffectedId,
    ClientId,
    ClientHostname,
}

impl FilterField {
    const ALL: [FilterField; 11] = [
        FilterField::TimestampGt,
        FilterField::TimestampLt,
        FilterField::TimestampSince,
        FilterField::TimestampUntil,
        FilterField::Username,
        FilterField::RemoteIp,
        FilterField::Application,
        FilterField::Action,
        FilterField::AffectedId,
        FilterField::ClientId,
        FilterField::ClientHostname,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterField::TimestampGt => "timestamp[gt]",
            FilterField::TimestampLt => "timestamp[lt]",
            FilterField::TimestampSince => "timestamp[since]",
            FilterField::TimestampUntil => "timestamp[until]",
            FilterField::Username => "username",
            FilterField::RemoteIp => "remote_ip",
            FilterField::Application => "application",
            FilterField::Action => "action",
            FilterField::AffectedId => "affected_id",
            FilterField::ClientId => "client_id",
            FilterField::ClientHostname => "client_hostname",
        }
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(
            self,
            FilterField::TimestampGt
                | FilterField::TimestampLt
                | FilterField::TimestampSince
                | FilterField::TimestampUntil
        )
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Timestamp,
    Username,
    RemoteIp,
    Application,
    Action,
    AffectedId,
    ClientId,
    ClientHostname,
}

impl SortField {
    const ALL: [SortField; 8] = [
        SortField::Timestamp,
        SortField::Username,
        SortField::RemoteIp,
        SortField::Application,
        SortField::Action,
        SortField::AffectedId,
        SortField::ClientId,
        SortField::ClientHostname,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SortField::Timestamp => "timestamp",
            SortField::Username => "username",
            SortField::RemoteIp => "remote_ip",
            SortField::Application => "application",
            SortField::Action => "action",
            SortField::AffectedId => "affected_id",
            SortField::ClientId => "client_id",
            SortField::ClientHostname => "client_hostname",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

/// Values of one filter are OR-ed; different filters are AND-ed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: FilterField,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub filters: Vec<Filter>,
    pub sorts: Vec<Sort>,
    pub pagination: Option<Pagination>,
}

impl ListOptions {
    pub fn filter<I, S>(mut self, field: FilterField, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.push(Filter {
            field,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn sort(mut self, field: SortField, ascending: bool) -> Self {
        self.sorts.push(Sort { field, ascending });
        self
    }

    pub fn page(mut self, limit: u64, offset: u64) -> Self {
        self.pagination = Some(Pagination { limit, offset });
        self
    }

    /// Same query without the page window, used for counting.
    pub fn without_pagination(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            sorts: Vec::new(),
            pagination: None,
        }
    }

    /// Builds options from raw query parameters and validates them.
    /// Unknown parameters outside `filter[..]`, `sort` and `page[..]` are ignored.
    pub fn parse<K, V>(params: &[(K, V)]) -> Result<Self, ListOptionsError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = ListOptions::default();
        let mut pagination = Pagination::default();
        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            if let Some(name) = key.strip_prefix("filter[").and_then(|k| k.strip_suffix(']')) {
                let field = FilterField::from_name(name)
                    .ok_or_else(|| ListOptionsError::UnsupportedFilter(name.to_string()))?;
                let values = value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                if !values.is_empty() {
                    options.filters.push(Filter { field, values });
                }
            } else if key == "sort" {
                for raw in value.split(',').map(str::trim).filter(|v| !v.is_empty()) {
                    let (name, ascending) = match raw.strip_prefix('-') {
                        Some(name) => (name, false),
                        None => (raw, true),
                    };
                    let field = SortField::from_name(name)
                        .ok_or_else(|| ListOptionsError::UnsupportedSort(name.to_string()))?;
                    options.sorts.push(Sort { field, ascending });
                }
            } else if key == "page[limit]" {
                pagination.limit = value.parse().map_err(|_| {
                    ListOptionsError::BadPagination("pagination limit must be a number".into())
                })?;
            } else if key == "page[offset]" {
                pagination.offset = value.parse().map_err(|_| {
                    ListOptionsError::BadPagination(
                        "pagination offset must be a non-negative number".into(),
                    )
                })?;
            }
        }
        options.pagination = Some(pagination);
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ListOptionsError> {
        if let Some(p) = self.pagination {
            if p.limit == 0 {
                return Err(ListOptionsError::BadPagination(
                    "pagination limit must be positive".into(),
                ));
            }
            if p.limit > MAX_LIMIT {
                return Err(ListOptionsError::BadPagination(format!(
                    "pagination limit too big ({}) maximum is {}",
                    p.limit, MAX_LIMIT
                )));
            }
        }
        for f in self.filters.iter().filter(|f| f.field.is_timestamp()) {
            for v in &f.values {
                if parse_timestamp_value(v).is_none() {
                    return Err(ListOptionsError::UnsupportedFilter(format!(
                        "{}: {:?} is neither RFC3339 nor YYYY-MM-DD",
                        f.field.name(),
                        v
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Accepts RFC3339 timestamps and plain dates (midnight UTC).
pub fn parse_timestamp_value(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let params = [
            ("filter[application]", "client, client.tunnel"),
            ("filter[timestamp[since]]", "2026-01-01"),
            ("sort", "-timestamp,username"),
            ("page[limit]", "20"),
            ("page[offset]", "40"),
        ];
        let options = ListOptions::parse(&params).unwrap();
        assert_eq!(
            options.filters[0],
            Filter {
                field: FilterField::Application,
                values: vec!["client".into(), "client.tunnel".into()],
            }
        );
        assert_eq!(options.filters[1].field, FilterField::TimestampSince);
        assert_eq!(
            options.sorts,
            vec![
                Sort { field: SortField::Timestamp, ascending: false },
                Sort { field: SortField::Username, ascending: true },
            ]
        );
        assert_eq!(options.pagination, Some(Pagination { limit: 20, offset: 40 }));
    }

    #[test]
    fn test_default_pagination() {
        let options = ListOptions::parse::<&str, &str>(&[]).unwrap();
        assert_eq!(options.pagination, Some(Pagination { limit: 10, offset: 0 }));
    }

    #[test]
    fn test_rejects_invalid_options() {
        assert!(matches!(
            ListOptions::parse(&[("filter[request]", "x")]),
            Err(ListOptionsError::UnsupportedFilter(_))
        ));
        assert!(matches!(
            ListOptions::parse(&[("sort", "request")]),
            Err(ListOptionsError::UnsupportedSort(_))
        ));
        assert!(matches!(
            ListOptions::parse(&[("page[limit]", "101")]),
            Err(ListOptionsError::BadPagination(_))
        ));
        assert!(matches!(
            ListOptions::parse(&[("page[limit]", "0")]),
            Err(ListOptionsError::BadPagination(_))
        ));
        assert!(matches!(
            ListOptions::parse(&[("page[offset]", "-1")]),
            Err(ListOptionsError::BadPagination(_))
        ));
        assert!(matches!(
            ListOptions::parse(&[("filter[timestamp[gt]]", "yesterday")]),
            Err(ListOptionsError::UnsupportedFilter(_))
        ));
    }

    #[test]
    fn test_parse_timestamp_value() {
        let date = parse_timestamp_value("2026-10-16").unwrap();
        assert_eq!(date.to_rfc3339(), "2026-10-16T00:00:00+00:00");
        let ts = parse_timestamp_value("2026-10-16T12:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-10-16T10:00:00+00:00");
        assert!(parse_timestamp_value("16/10/2026").is_none());
    }

    #[test]
    fn test_without_pagination() {
        let options = ListOptions::default()
            .filter(FilterField::Action, ["create"])
            .sort(SortField::Timestamp, true)
            .page(5, 5);
        let count = options.without_pagination();
        assert_eq!(count.filters, options.filters);
        assert!(count.pagination.is_none());
    }
}
