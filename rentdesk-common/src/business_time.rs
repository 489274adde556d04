//! Business timezone and calendar windows
//!
//! Revenue and traffic windows are evaluated in a fixed UTC offset
//! (UTC+8 unless configured otherwise). Boundaries are computed on the local
//! calendar and returned as UTC instants so they compare directly against
//! stored timestamps.

use crate::{Error, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar granularity for windows and buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Period {
    /// Every period, narrowest first
    pub const ALL: [Period; 5] = [
        Period::Day,
        Period::Week,
        Period::Month,
        Period::Quarter,
        Period::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Quarter => "quarter",
            Period::Year => "year",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Period::Day),
            "week" | "weekly" => Ok(Period::Week),
            "month" | "monthly" => Ok(Period::Month),
            "quarter" | "quarterly" => Ok(Period::Quarter),
            "year" | "yearly" => Ok(Period::Year),
            other => Err(Error::InvalidInput(format!("Unknown period: {}", other))),
        }
    }
}

/// Fixed-offset business timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessTz {
    offset: FixedOffset,
}

impl Default for BusinessTz {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(8 * 3600).expect("UTC+8 is a valid offset"),
        }
    }
}

impl BusinessTz {
    /// Offsets outside UTC-12..=UTC+14 are rejected
    pub fn new(offset_hours: i32) -> Result<Self> {
        if !(-12..=14).contains(&offset_hours) {
            return Err(Error::Config(format!(
                "Business UTC offset must be between -12 and 14 hours, got {}",
                offset_hours
            )));
        }

        let offset = FixedOffset::east_opt(offset_hours * 3600).ok_or_else(|| {
            Error::Config(format!("Invalid UTC offset: {} hours", offset_hours))
        })?;

        Ok(Self { offset })
    }

    pub fn offset_hours(&self) -> i32 {
        self.offset.local_minus_utc() / 3600
    }

    pub fn fixed_offset(&self) -> FixedOffset {
        self.offset
    }

    /// Instant expressed in the business timezone
    pub fn to_local(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset)
    }

    /// Business calendar date containing `instant`
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.to_local(instant).date_naive()
    }

    /// Local midnight of `date` as a UTC instant
    pub fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(NaiveTime::MIN);
        Utc.from_utc_datetime(&(local - Duration::seconds(self.offset.local_minus_utc() as i64)))
    }

    /// Start of the `period` window containing `instant`
    pub fn start_of(&self, period: Period, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.midnight(period_start_date(period, self.local_date(instant)))
    }

    /// Start of the window following the one that begins at `bucket_start`
    pub fn next_start(&self, period: Period, bucket_start: DateTime<Utc>) -> DateTime<Utc> {
        let date = period_start_date(period, self.local_date(bucket_start));
        let next = match period {
            Period::Day => date + Duration::days(1),
            Period::Week => date + Duration::days(7),
            Period::Month => next_month_start(date),
            Period::Quarter => next_month_start(next_month_start(next_month_start(date))),
            Period::Year => year_start(date + Duration::days(366)),
        };
        self.midnight(next)
    }
}

/// First date of the `period` window containing `date`
fn period_start_date(period: Period, date: NaiveDate) -> NaiveDate {
    match period {
        Period::Day => date,
        Period::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
        Period::Month => month_start(date),
        Period::Quarter => {
            let mut start = month_start(date);
            for _ in 0..(date.month0() % 3) {
                start = month_start(start - Duration::days(1));
            }
            start
        }
        Period::Year => year_start(date),
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.day0() as i64)
}

fn next_month_start(date: NaiveDate) -> NaiveDate {
    month_start(month_start(date) + Duration::days(32))
}

fn year_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.ordinal0() as i64)
}
