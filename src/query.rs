//! Query filters and their validation.
//!
//! Frontends hand raw, untrusted parameters to [`LogQuery::from_params`];
//! only a validated [`LogQuery`] ever reaches a [`LogReader`](crate::store::LogReader).

use crate::record::LogRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Result cap used when the caller does not pass `limit`.
pub const DEFAULT_LIMIT: usize = 100;

/// Raw query-string parameters as received by the query frontend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    pub service: Option<String>,
    pub level: Option<String>,
    pub user: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<String>,
}

/// A validated filter over stored records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub service: String,
    pub level: Option<String>,
    pub user: Option<String>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub limit: usize,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid {0} parameter, use RFC3339 format (e.g. 2023-01-01T00:00:00Z)")]
    InvalidTimestamp(&'static str),

    #[error("invalid limit parameter, must be a positive integer")]
    InvalidLimit,

    #[error("invalid time range: 'from' must not be after 'to'")]
    InvalidRange,
}

impl LogQuery {
    /// Validate raw parameters.
    ///
    /// `service`, `from` and `to` are required; `level` and `user` are
    /// optional equality filters where an empty value means "no filter".
    pub fn from_params(params: &QueryParams) -> Result<Self, QueryError> {
        let service = non_empty(params.service.as_deref())
            .ok_or(QueryError::MissingParameter("service"))?
            .to_string();
        let from = parse_bound(params.from.as_deref(), "from")?;
        let to = parse_bound(params.to.as_deref(), "to")?;

        let limit = match non_empty(params.limit.as_deref()) {
            None => DEFAULT_LIMIT,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(QueryError::InvalidLimit),
            },
        };

        if from > to {
            return Err(QueryError::InvalidRange);
        }

        Ok(Self {
            service,
            level: non_empty(params.level.as_deref()).map(str::to_string),
            user: non_empty(params.user.as_deref()).map(str::to_string),
            from,
            to,
            limit,
        })
    }

    /// Whether `record` passes every filter (the limit is not considered).
    pub fn matches(&self, record: &LogRecord) -> bool {
        record.service == self.service
            && self.level.as_deref().map_or(true, |l| record.level == l)
            && self.user.as_deref().map_or(true, |u| record.user() == Some(u))
            && record.timestamp >= self.from
            && record.timestamp <= self.to
    }

    /// Normalised echo of this query for responses.
    pub fn echo(&self) -> QueryEcho {
        QueryEcho {
            service: self.service.clone(),
            level: self.level.clone().unwrap_or_default(),
            user: self.user.clone().unwrap_or_default(),
            from: self.from.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            to: self.to.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryEcho {
    pub service: String,
    pub level: String,
    pub user: String,
    pub from: String,
    pub to: String,
    pub limit: usize,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_bound(value: Option<&str>, name: &'static str) -> Result<DateTime<Utc>, QueryError> {
    let raw = non_empty(value).ok_or(QueryError::MissingParameter(name))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| QueryError::InvalidTimestamp(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params(service: &str, from: &str, to: &str) -> QueryParams {
        QueryParams {
            service: Some(service.to_string()),
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_limit_and_optional_filters() {
        let query = LogQuery::from_params(&params(
            "auth",
            "2024-01-01T00:00:00Z",
            "2024-01-02T00:00:00Z",
        ))
        .unwrap();

        assert_eq!(query.service, "auth");
        assert_eq!(query.limit, DEFAULT_LIMIT);
        assert_eq!(query.level, None);
        assert_eq!(query.user, None);
        assert_eq!(query.from, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_service() {
        let mut p = params("", "2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z");
        assert_eq!(
            LogQuery::from_params(&p),
            Err(QueryError::MissingParameter("service"))
        );
        p.service = None;
        assert_eq!(
            LogQuery::from_params(&p),
            Err(QueryError::MissingParameter("service"))
        );
    }

    #[test]
    fn test_bad_timestamps() {
        let p = params("auth", "yesterday", "2024-01-02T00:00:00Z");
        assert_eq!(
            LogQuery::from_params(&p),
            Err(QueryError::InvalidTimestamp("from"))
        );

        let mut p = params("auth", "2024-01-01T00:00:00Z", "");
        assert_eq!(
            LogQuery::from_params(&p),
            Err(QueryError::MissingParameter("to"))
        );
        p.to = Some("2024-13-01T00:00:00Z".to_string());
        assert_eq!(
            LogQuery::from_params(&p),
            Err(QueryError::InvalidTimestamp("to"))
        );
    }

    #[test]
    fn test_limit_must_be_positive() {
        for bad in ["0", "-5", "ten", "1.5"] {
            let mut p = params("auth", "2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z");
            p.limit = Some(bad.to_string());
            assert_eq!(LogQuery::from_params(&p), Err(QueryError::InvalidLimit), "{bad}");
        }

        let mut p = params("auth", "2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z");
        p.limit = Some("25".to_string());
        assert_eq!(LogQuery::from_params(&p).unwrap().limit, 25);
    }

    #[test]
    fn test_from_after_to_rejected() {
        let p = params("auth", "2024-01-02T00:00:00Z", "2024-01-01T00:00:00Z");
        assert_eq!(LogQuery::from_params(&p), Err(QueryError::InvalidRange));

        let same = params("auth", "2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z");
        assert!(LogQuery::from_params(&same).is_ok());
    }

    #[test]
    fn test_matches_filters() {
        let mut p = params("auth", "2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z");
        p.level = Some("error".to_string());
        p.user = Some("alice".to_string());
        let query = LogQuery::from_params(&p).unwrap();

        let inside = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let hit = LogRecord::new("auth", "error", "denied")
            .at(inside)
            .with_attribute("user", "alice");
        assert!(query.matches(&hit));

        assert!(!query.matches(&hit.clone().with_attribute("user", "bob")));
        assert!(!query.matches(&LogRecord { level: "info".into(), ..hit.clone() }));
        assert!(!query.matches(&LogRecord { service: "billing".into(), ..hit.clone() }));
        assert!(!query.matches(&hit.clone().at(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap())));
        // bounds are inclusive
        assert!(query.matches(&hit.clone().at(query.to)));
    }

    #[test]
    fn test_echo_normalises_bounds() {
        let query = LogQuery::from_params(&params(
            "auth",
            "2024-01-01T02:00:00+02:00",
            "2024-01-02T00:00:00Z",
        ))
        .unwrap();
        let echo = query.echo();
        assert_eq!(echo.from, "2024-01-01T00:00:00Z");
        assert_eq!(echo.to, "2024-01-02T00:00:00Z");
        assert_eq!(echo.level, "");
        assert_eq!(echo.limit, 100);
    }
}
