//! Date selectors (`today`, `yesterday`, `last:N`, `YYYY-MM-DD`, `all`) and the
//! inclusive local-time windows they resolve to.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use super::entities::Message;
use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    Today,
    Yesterday,
    LastDays(u32),
    Date(NaiveDate),
    All,
}

impl FromStr for DateFilter {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "today" => return Ok(DateFilter::Today),
            "yesterday" => return Ok(DateFilter::Yesterday),
            "all" => return Ok(DateFilter::All),
            _ => {}
        }

        if let Some(days) = s.strip_prefix("last:") {
            return match days.parse::<u32>() {
                Ok(n) if n >= 1 => Ok(DateFilter::LastDays(n)),
                _ => Err(DomainError::InvalidFilter(s.to_string())),
            };
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(DateFilter::Date)
            .map_err(|_| DomainError::InvalidFilter(s.to_string()))
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateFilter::Today => f.write_str("today"),
            DateFilter::Yesterday => f.write_str("yesterday"),
            DateFilter::LastDays(n) => write!(f, "last:{}", n),
            DateFilter::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            DateFilter::All => f.write_str("all"),
        }
    }
}

impl DateFilter {
    /// Resolve against the local wall-clock time `now`.
    pub fn window(&self, now: NaiveDateTime) -> DateWindow {
        let today = now.date();
        match self {
            DateFilter::Today => DateWindow::day(today),
            DateFilter::Yesterday => DateWindow::day(today - Duration::days(1)),
            DateFilter::Date(d) => DateWindow::day(*d),
            DateFilter::LastDays(n) => DateWindow {
                start: Some(now - Duration::days(i64::from(*n))),
                end: Some(end_of_day(today)),
            },
            DateFilter::All => DateWindow::unbounded(),
        }
    }

    /// The single calendar day this selector names, if any.
    pub fn target_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            DateFilter::Today => Some(today),
            DateFilter::Yesterday => Some(today - Duration::days(1)),
            DateFilter::Date(d) => Some(*d),
            DateFilter::LastDays(_) | DateFilter::All => None,
        }
    }

    /// How long a snapshot stays fresh for this selector.
    pub fn ttl_minutes(&self) -> i64 {
        match self {
            DateFilter::Today => 5,
            DateFilter::Yesterday | DateFilter::All => 60,
            DateFilter::LastDays(n) if *n <= 7 => 60,
            DateFilter::LastDays(_) | DateFilter::Date(_) => 1440,
        }
    }
}

/// Inclusive `[start, end]` window in local time; `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl DateWindow {
    pub fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// `[00:00:00, 23:59:59]` of `date`.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: Some(date.and_time(NaiveTime::MIN)),
            end: Some(end_of_day(date)),
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at <= e)
    }

    /// Messages with an unparsable `date_msk` are only inside an unbounded window.
    pub fn contains_message(&self, message: &Message) -> bool {
        match message.local_datetime() {
            Some(at) => self.contains(at),
            None => self.start.is_none() && self.end.is_none(),
        }
    }

    pub fn contains_utc(&self, at: DateTime<Utc>, offset: FixedOffset) -> bool {
        self.contains(at.with_timezone(&offset).naive_local())
    }

    pub fn is_before_start(&self, at: NaiveDateTime) -> bool {
        self.start.is_some_and(|s| at < s)
    }
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::seconds(1)
}
