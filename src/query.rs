//! Request parameters to event filters.
//!
//! Two optional parameters bound the query: `t1` and `t2`, each either
//! `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` (midnight), interpreted as UTC.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::interfaces::{EventFilter, QueryMaker, Result, StorageError};

pub const FIRST_DATE_PARAM: &str = "t1";
pub const SECOND_DATE_PARAM: &str = "t2";

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Builds time-bounded filters capped at a fixed number of rows.
#[derive(Debug, Clone)]
pub struct SqlQueryMaker {
    return_limit: u64,
}

impl SqlQueryMaker {
    pub fn new(return_limit: u64) -> Self {
        Self { return_limit }
    }
}

fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
        .or_else(|_| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .map(|date| date.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map(|naive| naive.and_utc())
        .map_err(|_| StorageError::MalformedQuery(format!("cannot parse date '{value}'")))
}

impl QueryMaker for SqlQueryMaker {
    fn form_query(&self, params: Option<&HashMap<String, String>>) -> Result<EventFilter> {
        let Some(params) = params else {
            return Ok(self.default_query());
        };

        let first = params.get(FIRST_DATE_PARAM).map(|v| parse_date(v)).transpose()?;
        let second = params.get(SECOND_DATE_PARAM).map(|v| parse_date(v)).transpose()?;

        let (a, b) = match (first, second) {
            (Some(a), Some(b)) => (a, b),
            (Some(one), None) | (None, Some(one)) => (one, Utc::now()),
            (None, None) => {
                return Err(StorageError::MalformedQuery(format!(
                    "expected '{FIRST_DATE_PARAM}' and/or '{SECOND_DATE_PARAM}'"
                )))
            }
        };

        Ok(EventFilter::between(a, b).with_limit(self.return_limit))
    }

    fn default_query(&self) -> EventFilter {
        EventFilter::all().with_limit(self.return_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn maker() -> SqlQueryMaker {
        SqlQueryMaker::new(10)
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_no_parameters_gives_default() {
        let filter = maker().form_query(None).unwrap();
        assert_eq!(filter, maker().default_query());
        assert_eq!(filter.limit, Some(10));
        assert!(filter.from.is_none() && filter.to.is_none());
    }

    #[test]
    fn test_bad_dates_are_malformed() {
        let result = maker().form_query(Some(&params(&[("t1", "bad format"), ("t2", "bad format")])));
        assert!(matches!(result, Err(StorageError::MalformedQuery(_))));
    }

    #[test]
    fn test_no_dates_are_malformed() {
        let result = maker().form_query(Some(&HashMap::new()));
        assert!(matches!(result, Err(StorageError::MalformedQuery(_))));
    }

    #[test]
    fn test_single_date_runs_until_now() {
        let old = Utc.with_ymd_and_hms(1990, 10, 10, 10, 0, 0).unwrap();
        for key in ["t1", "t2"] {
            let before = Utc::now();
            let filter = maker()
                .form_query(Some(&params(&[(key, "1990-10-10 10:00:00")])))
                .unwrap();
            assert_eq!(filter.from, Some(old));
            assert!(filter.to.unwrap() >= before);
        }
    }

    #[test]
    fn test_dates_are_ordered() {
        let older = Utc.with_ymd_and_hms(2013, 10, 10, 10, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2014, 10, 10, 10, 0, 0).unwrap();

        let forward = maker()
            .form_query(Some(&params(&[("t1", "2013-10-10 10:00:00"), ("t2", "2014-10-10 10:00:00")])))
            .unwrap();
        let backward = maker()
            .form_query(Some(&params(&[("t1", "2014-10-10 10:00:00"), ("t2", "2013-10-10 10:00:00")])))
            .unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.from, Some(older));
        assert_eq!(forward.to, Some(newer));
        assert_ne!(forward, maker().default_query());
    }

    #[test]
    fn test_date_without_time_is_midnight() {
        let filter = maker()
            .form_query(Some(&params(&[("t1", "2013-10-10"), ("t2", "2014-10-10")])))
            .unwrap();
        assert_eq!(filter.from, Some(Utc.with_ymd_and_hms(2013, 10, 10, 0, 0, 0).unwrap()));
        assert_eq!(filter.to, Some(Utc.with_ymd_and_hms(2014, 10, 10, 0, 0, 0).unwrap()));
    }
}
