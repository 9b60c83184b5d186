use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::error::{QueryError, Result};

/// Named look-back windows offered by the dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DateRangePreset {
    #[serde(rename = "30d")]
    Days30,
    #[serde(rename = "90d")]
    Days90,
    #[serde(rename = "1y")]
    Year,
    #[serde(rename = "all")]
    All,
}

impl DateRangePreset {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "30d" => Some(Self::Days30),
            "90d" => Some(Self::Days90),
            "1y" => Some(Self::Year),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// Start of the window ending at `now`.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Days30 => now - Duration::days(30),
            Self::Days90 => now - Duration::days(90),
            Self::Year => now - Duration::days(365),
            Self::All => history_start(),
        }
    }
}

/// Earliest timestamp the warehouse holds data for.
fn history_start() -> DateTime<Utc> {
    Utc.from_utc_datetime(
        &NaiveDate::from_ymd_opt(2020, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap_or_default(),
    )
}

/// Inclusive `[start, end]` window applied to a metric's `ts` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(QueryError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn preset(preset: DateRangePreset, now: DateTime<Utc>) -> Self {
        Self {
            start: preset.start(now),
            end: now,
        }
    }

    /// Whole-day window from `start` 00:00:00 to `end` 23:59:59.
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let start = start.and_hms_opt(0, 0, 0).unwrap_or_default();
        let end = end.and_hms_opt(23, 59, 59).unwrap_or_default();
        Self::new(Utc.from_utc_datetime(&start), Utc.from_utc_datetime(&end))
    }

    /// Both bounds included.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}
